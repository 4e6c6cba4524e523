//! Authenticated encryption for Sacred Mesh payloads (XChaCha20-Poly1305).
//!
//! Key establishment is not part of this module: callers hand in resolved
//! symmetric keys through a [`KeyProvider`].

mod aead;
mod keys;

pub use aead::{Sealed, decrypt, encrypt};
pub use keys::{KeyProvider, MeshKey, StaticKeys};

/// Length of symmetric keys in bytes.
pub const KEY_LEN: usize = 32;
/// Length of XChaCha20 nonces in bytes.
pub const NONCE_LEN: usize = 24;
/// Length of Poly1305 authentication tags in bytes.
pub const TAG_LEN: usize = 16;

/// Error type for cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Key material of unexpected length.
    #[error("invalid key length")]
    InvalidKeyLength,
    /// Authentication failure during decryption.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// Cipher refused to seal the plaintext.
    #[error("encryption failed")]
    EncryptionFailed,
}
