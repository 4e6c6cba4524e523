//! Sacred Mesh message kinds and recipients

use std::fmt;

use super::{DecodeError, ValidationError, Value};

/// Message kinds carried inside the sealed payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Addressed to a single peer
    Direct = 0x01,
    /// Addressed to members of a circle
    Circle = 0x02,
    /// Addressed to everyone
    Broadcast = 0x03,
}

impl MessageKind {
    /// Convert from byte
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Direct),
            0x02 => Some(Self::Circle),
            0x03 => Some(Self::Broadcast),
            _ => None,
        }
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Direct => "Direct",
            Self::Circle => "Circle",
            Self::Broadcast => "Broadcast",
        };
        write!(f, "{name}")
    }
}

/// Who a message is meant for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Recipient {
    /// Every peer on the mesh
    #[default]
    Broadcast,
    /// One peer, by sender id
    Peer(String),
    /// Members of a circle, by group id
    Circle(String),
}

impl Recipient {
    /// Message kind for this recipient
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Broadcast => MessageKind::Broadcast,
            Self::Peer(_) => MessageKind::Direct,
            Self::Circle(_) => MessageKind::Circle,
        }
    }

    /// Whether this addresses exactly the peer `id`
    #[must_use]
    pub fn is_peer(&self, id: &str) -> bool {
        matches!(self, Self::Peer(target) if target == id)
    }

    /// Check that peer and circle identifiers are present
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Peer(id) | Self::Circle(id) if id.is_empty() => {
                Err(ValidationError::EmptyRecipient)
            }
            _ => Ok(()),
        }
    }

    /// Wire form: `[kind]` for broadcast, `[kind, target]` otherwise.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let kind = Value::from(self.kind().as_u8());
        match self {
            Self::Broadcast => Value::Array(vec![kind]),
            Self::Peer(target) | Self::Circle(target) => {
                Value::Array(vec![kind, Value::Text(target.clone())])
            }
        }
    }

    /// Parse the wire form produced by [`Recipient::to_value`].
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        const FIELD: &str = "recipient";
        let invalid = |reason| DecodeError::InvalidField {
            field: FIELD,
            reason,
        };

        let items = value.as_array().ok_or(invalid("expected array"))?;
        let kind = items
            .first()
            .and_then(Value::as_u64)
            .and_then(|raw| u8::try_from(raw).ok())
            .and_then(MessageKind::from_u8)
            .ok_or(invalid("unknown message kind"))?;
        let target = items.get(1).map(|target| {
            target
                .as_str()
                .map(str::to_owned)
                .ok_or(invalid("expected text target"))
        });

        match (kind, target, items.len()) {
            (MessageKind::Broadcast, None, 1) => Ok(Self::Broadcast),
            (MessageKind::Direct, Some(target), 2) => Ok(Self::Peer(target?)),
            (MessageKind::Circle, Some(target), 2) => Ok(Self::Circle(target?)),
            _ => Err(invalid("unexpected arity")),
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => write!(f, "broadcast"),
            Self::Peer(id) => write!(f, "peer {id}"),
            Self::Circle(id) => write!(f, "circle {id}"),
        }
    }
}
