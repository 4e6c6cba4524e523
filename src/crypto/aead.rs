//! XChaCha20-Poly1305 seal/open with detached tags.

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Tag, XChaCha20Poly1305, XNonce};
use rand::RngCore;

use super::{CryptoError, MeshKey, NONCE_LEN, TAG_LEN};

/// Output of [`encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Encrypted payload, same length as the plaintext
    pub ciphertext: Vec<u8>,
    /// Fresh random nonce
    pub nonce: [u8; NONCE_LEN],
    /// Tag covering ciphertext and associated data
    pub tag: [u8; TAG_LEN],
}

/// Seal `plaintext` under `key` with a fresh random 24-byte nonce.
///
/// `aad` is authenticated but not encrypted.
pub fn encrypt(plaintext: &[u8], key: &MeshKey, aad: &[u8]) -> Result<Sealed, CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(&nonce), aad, &mut ciphertext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);
    Ok(Sealed {
        ciphertext,
        nonce,
        tag: tag_bytes,
    })
}

/// Open a sealed payload.
///
/// Any change to ciphertext, nonce, tag, key or `aad` yields
/// [`CryptoError::AuthenticationFailed`]; no plaintext is released in that case.
pub fn decrypt(
    ciphertext: &[u8],
    nonce: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
    key: &MeshKey,
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let mut plaintext = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            XNonce::from_slice(nonce),
            aad,
            &mut plaintext,
            Tag::from_slice(tag),
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AAD: &[u8] = b"message-id|sender";

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = MeshKey::generate();
        let plaintext = b"harmony and protection";

        let sealed = encrypt(plaintext, &key, AAD).unwrap();
        assert_eq!(sealed.ciphertext.len(), plaintext.len());
        assert_ne!(sealed.ciphertext.as_slice(), plaintext);

        let opened = decrypt(&sealed.ciphertext, &sealed.nonce, &sealed.tag, &key, AAD).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = MeshKey::generate();
        let a = encrypt(b"same", &key, AAD).unwrap();
        let b = encrypt(b"same", &key, AAD).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(b"secret", &MeshKey::generate(), AAD).unwrap();
        let result = decrypt(
            &sealed.ciphertext,
            &sealed.nonce,
            &sealed.tag,
            &MeshKey::generate(),
            AAD,
        );
        assert_eq!(result, Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn test_every_bit_flip_is_rejected() {
        let key = MeshKey::generate();
        let sealed = encrypt(b"stay safe", &key, AAD).unwrap();

        for byte in 0..sealed.ciphertext.len() {
            for bit in 0..8 {
                let mut ciphertext = sealed.ciphertext.clone();
                ciphertext[byte] ^= 1 << bit;
                assert!(decrypt(&ciphertext, &sealed.nonce, &sealed.tag, &key, AAD).is_err());
            }
        }
        for byte in 0..TAG_LEN {
            for bit in 0..8 {
                let mut tag = sealed.tag;
                tag[byte] ^= 1 << bit;
                assert!(decrypt(&sealed.ciphertext, &sealed.nonce, &tag, &key, AAD).is_err());
            }
        }
        for byte in 0..NONCE_LEN {
            let mut nonce = sealed.nonce;
            nonce[byte] ^= 0x01;
            assert!(decrypt(&sealed.ciphertext, &nonce, &sealed.tag, &key, AAD).is_err());
        }
    }

    #[test]
    fn test_associated_data_is_bound() {
        let key = MeshKey::generate();
        let sealed = encrypt(b"intent", &key, AAD).unwrap();
        let result = decrypt(
            &sealed.ciphertext,
            &sealed.nonce,
            &sealed.tag,
            &key,
            b"message-id|mallory",
        );
        assert_eq!(result, Err(CryptoError::AuthenticationFailed));
    }
}
