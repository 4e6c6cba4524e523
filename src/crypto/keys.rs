//! Symmetric key material and key resolution.

use std::collections::HashMap;
use std::fmt;

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{CryptoError, KEY_LEN};
use crate::protocol::Recipient;

/// 256-bit symmetric key shared with a peer, a circle, or the whole mesh.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MeshKey([u8; KEY_LEN]);

impl MeshKey {
    /// Construct from a fixed-size array.
    #[must_use]
    pub const fn from_array(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Construct from raw byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self(array))
    }

    /// Generate a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Borrow as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for MeshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MeshKey(..)")
    }
}

/// Resolves already-established keys; pairing and handshakes live elsewhere.
pub trait KeyProvider: Send + Sync {
    /// Key used to seal a message for `recipient`.
    fn outbound_key(&self, recipient: &Recipient) -> Option<MeshKey>;

    /// Keys worth trying, in order, when opening a message from `sender_id`.
    fn inbound_keys(&self, sender_id: &str) -> Vec<MeshKey>;
}

/// In-memory key table: one broadcast key plus optional peer and circle keys.
///
/// Peer and circle messages fall back to the broadcast key when no dedicated
/// key is known.
#[derive(Clone, Debug)]
pub struct StaticKeys {
    broadcast: MeshKey,
    peers: HashMap<String, MeshKey>,
    circles: HashMap<String, MeshKey>,
}

impl StaticKeys {
    /// Create a table holding only the broadcast key.
    #[must_use]
    pub fn new(broadcast: MeshKey) -> Self {
        Self {
            broadcast,
            peers: HashMap::new(),
            circles: HashMap::new(),
        }
    }

    /// Register the pairwise key shared with `peer_id`.
    #[must_use]
    pub fn with_peer(mut self, peer_id: impl Into<String>, key: MeshKey) -> Self {
        self.peers.insert(peer_id.into(), key);
        self
    }

    /// Register the key shared by members of `group_id`.
    #[must_use]
    pub fn with_circle(mut self, group_id: impl Into<String>, key: MeshKey) -> Self {
        self.circles.insert(group_id.into(), key);
        self
    }
}

impl KeyProvider for StaticKeys {
    fn outbound_key(&self, recipient: &Recipient) -> Option<MeshKey> {
        let key = match recipient {
            Recipient::Broadcast => &self.broadcast,
            Recipient::Peer(id) => self.peers.get(id).unwrap_or(&self.broadcast),
            Recipient::Circle(id) => self.circles.get(id).unwrap_or(&self.broadcast),
        };
        Some(key.clone())
    }

    fn inbound_keys(&self, sender_id: &str) -> Vec<MeshKey> {
        let mut keys = Vec::with_capacity(2 + self.circles.len());
        if let Some(key) = self.peers.get(sender_id) {
            keys.push(key.clone());
        }
        keys.extend(self.circles.values().cloned());
        keys.push(self.broadcast.clone());
        keys
    }
}
