//! Sacred Mesh protocol core
//!
//! This module provides the value codec, the caller-facing intent message, and
//! the wire envelope that carries a sealed intent between peers.

mod codec;
mod envelope;
mod error;
mod message;
mod types;
mod value;

pub use codec::{decode, encode, encode_into};
pub use envelope::{IntentPayload, MessageId, WireEnvelope, build_envelope, parse_envelope};
pub use error::{DecodeError, EncodeError, Error, Result, ValidationError};
pub use message::IntentMessage;
pub use types::{MessageKind, Recipient};
pub use value::{MapView, Value};

/// Maximum size of a serialized wire envelope in bytes (fits a single LoRa frame).
pub const MAX_PACKET_SIZE: usize = 256;

/// Maximum note length in UTF-8 bytes.
pub const MAX_NOTE_LEN: usize = 96;

/// Maximum sigil length in UTF-8 bytes.
pub const MAX_SIGIL_LEN: usize = 32;

/// Largest hop limit a message may carry.
pub const MAX_HOP_LIMIT: u8 = 31;

/// Latest `ttlDeadline` the wire can carry (integers use at most a 4-byte argument).
pub const MAX_TTL_DEADLINE: u64 = 0xFFFF_FFFF;

/// Message identifier size in bytes.
pub const MESSAGE_ID_LEN: usize = 16;

/// Default time-to-live for new messages (1 hour).
pub const DEFAULT_TTL_SECS: u32 = 3600;

/// Default hop limit for new messages.
pub const DEFAULT_HOP_LIMIT: u8 = 5;
