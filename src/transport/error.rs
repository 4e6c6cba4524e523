//! Transport-level error types.

use core::fmt;

/// Unified error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Send attempted while the transport is down.
    NotConnected(String),
    /// Transport could not be brought up.
    ConnectFailed {
        /// Transport name.
        transport: String,
        /// Human readable cause.
        reason: String,
    },
    /// Transport accepted the frame but could not transmit it.
    SendFailed {
        /// Transport name.
        transport: String,
        /// Human readable cause.
        reason: String,
    },
    /// A transport with this name is already registered.
    DuplicateName(String),
    /// The receiving mesh has been dropped.
    ChannelClosed,
}

impl TransportError {
    /// Name of the transport involved, if any.
    #[must_use]
    pub fn transport(&self) -> Option<&str> {
        match self {
            Self::NotConnected(name) | Self::DuplicateName(name) => Some(name),
            Self::ConnectFailed { transport, .. } | Self::SendFailed { transport, .. } => {
                Some(transport)
            }
            Self::ChannelClosed => None,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected(name) => write!(f, "transport {name} is not connected"),
            Self::ConnectFailed { transport, reason } => {
                write!(f, "transport {transport} failed to connect: {reason}")
            }
            Self::SendFailed { transport, reason } => {
                write!(f, "transport {transport} failed to send: {reason}")
            }
            Self::DuplicateName(name) => write!(f, "transport {name} already registered"),
            Self::ChannelClosed => f.write_str("event channel closed"),
        }
    }
}

impl std::error::Error for TransportError {}
