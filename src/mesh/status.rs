//! Read-only view of a mesh's connection state.

use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle of a mesh instance.
///
/// `Uninitialized -> Initializing -> Connected <-> Disconnected -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Created, `initialize` not yet called
    #[default]
    Uninitialized,
    /// Transports are being brought up
    Initializing,
    /// At least one transport is active
    Connected,
    /// No transport is active; sends are queued
    Disconnected,
    /// Shut down; terminal
    Closed,
}

impl ConnectionState {
    /// Whether `initialize` has completed and `shutdown` has not
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Connected | Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Snapshot returned by [`SacredMesh::status`](super::SacredMesh::status).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshStatus {
    /// Active flag per transport name
    pub transports: BTreeMap<String, bool>,
    /// Any transport active
    pub is_connected: bool,
    /// Mirrors `is_connected`
    pub has_active_transports: bool,
    /// Depth of the outbound queue
    pub queued_messages: usize,
    /// Set only when initialization could bring up no transport
    pub error: Option<String>,
    /// Lifecycle state
    pub state: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_and_running() {
        assert_eq!(ConnectionState::default(), ConnectionState::Uninitialized);
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert!(ConnectionState::Connected.is_running());
        assert!(ConnectionState::Disconnected.is_running());
        assert!(!ConnectionState::Initializing.is_running());
        assert!(!ConnectionState::Closed.is_running());
    }
}
