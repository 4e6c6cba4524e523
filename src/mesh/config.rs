//! Mesh configuration.

use crate::protocol::{DEFAULT_HOP_LIMIT, DEFAULT_TTL_SECS, MAX_HOP_LIMIT, ValidationError};

/// What to do when the outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OverflowPolicy {
    /// Discard the oldest queued message to make room
    #[default]
    DropOldest,
    /// Refuse the new message with `Error::QueueOverflow`
    RejectNew,
}

/// Configuration for one [`SacredMesh`](super::SacredMesh) instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MeshConfig {
    /// Upper bound applied to every outgoing hop limit.
    pub max_hops: u8,
    /// TTL in seconds used by [`SacredMesh::compose`](super::SacredMesh::compose).
    pub default_ttl: u32,
    /// Capacity of the offline outbound queue.
    pub max_queue_size: usize,
    /// Behavior when the outbound queue is full.
    pub overflow_policy: OverflowPolicy,
    /// Number of message ids remembered for duplicate suppression.
    pub dedup_capacity: usize,
    /// Circles this node belongs to; circle messages for others are relayed only.
    pub circles: Vec<String>,
    /// Skip the transport a message arrived on when relaying it.
    pub exclude_origin_on_relay: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_HOP_LIMIT,
            default_ttl: DEFAULT_TTL_SECS,
            max_queue_size: 100,
            overflow_policy: OverflowPolicy::DropOldest,
            dedup_capacity: 1024,
            circles: Vec::new(),
            exclude_origin_on_relay: true,
        }
    }
}

/// Settings that may change while a mesh is running.
///
/// Unset fields keep their current value. Queue capacity, dedup capacity and
/// circle membership are fixed once the mesh is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigUpdate {
    /// New upper bound for outgoing hop limits
    pub max_hops: Option<u8>,
    /// New TTL for composed messages
    pub default_ttl: Option<u32>,
    /// Whether relays skip the arrival transport
    pub exclude_origin_on_relay: Option<bool>,
    /// Behavior of a full outbound queue
    pub overflow_policy: Option<OverflowPolicy>,
}

impl MeshConfig {
    /// Apply `update`, leaving the config untouched if any value is invalid.
    pub fn apply(&mut self, update: &ConfigUpdate) -> Result<(), ValidationError> {
        if update.default_ttl == Some(0) {
            return Err(ValidationError::ZeroTtl);
        }
        if let Some(max_hops) = update.max_hops.filter(|hops| *hops > MAX_HOP_LIMIT) {
            return Err(ValidationError::HopLimitTooHigh {
                hop_limit: max_hops,
                max: MAX_HOP_LIMIT,
            });
        }

        if let Some(max_hops) = update.max_hops {
            self.max_hops = max_hops;
        }
        if let Some(default_ttl) = update.default_ttl {
            self.default_ttl = default_ttl;
        }
        if let Some(exclude) = update.exclude_origin_on_relay {
            self.exclude_origin_on_relay = exclude;
        }
        if let Some(policy) = update.overflow_policy {
            self.overflow_policy = policy;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MeshConfig::default();
        assert_eq!(config.max_hops, 5);
        assert_eq!(config.default_ttl, 3600);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
        assert!(config.exclude_origin_on_relay);
        assert!(config.circles.is_empty());
    }

    #[test]
    fn test_apply_partial_update() {
        let mut config = MeshConfig::default();
        config
            .apply(&ConfigUpdate {
                max_hops: Some(2),
                exclude_origin_on_relay: Some(false),
                ..ConfigUpdate::default()
            })
            .unwrap();
        assert_eq!(config.max_hops, 2);
        assert!(!config.exclude_origin_on_relay);
        assert_eq!(config.default_ttl, 3600);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_apply_rejects_invalid_values() {
        let mut config = MeshConfig::default();
        let update = ConfigUpdate {
            max_hops: Some(3),
            default_ttl: Some(0),
            ..ConfigUpdate::default()
        };
        assert_eq!(config.apply(&update), Err(ValidationError::ZeroTtl));
        assert_eq!(config, MeshConfig::default());

        let update = ConfigUpdate {
            max_hops: Some(MAX_HOP_LIMIT + 1),
            ..ConfigUpdate::default()
        };
        assert!(matches!(
            config.apply(&update),
            Err(ValidationError::HopLimitTooHigh { .. })
        ));
        assert_eq!(config.max_hops, 5);
    }
}
