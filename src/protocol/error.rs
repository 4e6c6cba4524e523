//! Sacred Mesh error types

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::transport::TransportError;

/// Sacred Mesh errors
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an invalid intent message
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// Sealed envelope does not fit a single packet
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Serialized envelope size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Malformed binary input
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Value cannot be represented on the wire
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Authentication tag did not verify
    #[error("authentication failed")]
    Authentication,

    /// Cryptographic failure other than authentication
    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    /// Transport failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Outbound queue is full and configured to reject new entries
    #[error("outbound queue full ({capacity} entries)")]
    QueueOverflow {
        /// Configured queue capacity
        capacity: usize,
    },

    /// No key material resolved for the recipient
    #[error("no key available for {0}")]
    MissingKey(String),

    /// Mesh has been shut down
    #[error("mesh is closed")]
    Closed,
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailed => Self::Authentication,
            other => Self::Crypto(other),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Rejected intent message fields
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Message carries no sigils
    #[error("at least one sigil is required")]
    NoSigils,

    /// Sigil is an empty string
    #[error("sigil at index {index} is empty")]
    EmptySigil {
        /// Position of the empty sigil
        index: usize,
    },

    /// Sigil exceeds the length bound
    #[error("sigil `{sigil}` is {len} bytes (max {max})")]
    SigilTooLong {
        /// Offending sigil
        sigil: String,
        /// Its UTF-8 length
        len: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Sigil repeated within one message
    #[error("sigil `{0}` appears more than once")]
    DuplicateSigil(String),

    /// Intent strength is not a finite value in [0, 1]
    #[error("intent strength {0} is outside [0, 1]")]
    IntentStrengthOutOfRange(f32),

    /// Note exceeds the length bound
    #[error("note is {len} bytes (max {max})")]
    NoteTooLong {
        /// Note length in UTF-8 bytes
        len: usize,
        /// Maximum allowed
        max: usize,
    },

    /// TTL of zero seconds
    #[error("ttl must be positive")]
    ZeroTtl,

    /// TTL pushes the deadline past what the wire can encode
    #[error("ttl deadline {deadline} exceeds {max}")]
    DeadlineOutOfRange {
        /// Requested deadline, unix seconds
        deadline: u64,
        /// Latest encodable deadline
        max: u64,
    },

    /// Hop limit above the wire bound
    #[error("hop limit {hop_limit} exceeds {max}")]
    HopLimitTooHigh {
        /// Requested hop limit
        hop_limit: u8,
        /// Maximum allowed
        max: u8,
    },

    /// Peer or circle recipient with an empty identifier
    #[error("recipient identifier must not be empty")]
    EmptyRecipient,
}

/// Binary decoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before the value was complete
    #[error("truncated input: need {needed} more bytes at offset {offset}")]
    Truncated {
        /// Offset where more data was required
        offset: usize,
        /// Bytes required
        needed: usize,
    },

    /// Major type not used by the codec
    #[error("unknown major type {0}")]
    UnknownMajorType(u8),

    /// Simple value other than false/true/null/float32
    #[error("unsupported simple value {0}")]
    UnsupportedSimple(u8),

    /// Additional information selects an unsupported argument width
    #[error("unsupported length encoding {0}")]
    UnsupportedLength(u8),

    /// Text string is not valid UTF-8
    #[error("invalid UTF-8 in text at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the text payload
        offset: usize,
    },

    /// Map key is not a text string
    #[error("map key at offset {offset} is not text")]
    NonTextKey {
        /// Offset of the key
        offset: usize,
    },

    /// Bytes left over after a complete value
    #[error("{count} trailing bytes after value")]
    TrailingBytes {
        /// Number of unread bytes
        count: usize,
    },

    /// Arrays or maps nested too deeply
    #[error("nesting exceeds {max} levels")]
    DepthExceeded {
        /// Maximum nesting depth
        max: usize,
    },

    /// Frame larger than any valid envelope
    #[error("frame is {size} bytes (max {max})")]
    Oversized {
        /// Frame size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Required field absent from a structured value
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// Field present with the wrong type or shape
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// What was wrong
        reason: &'static str,
    },
}

/// Binary encoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Integer magnitude does not fit the 4-byte argument
    #[error("integer {0} outside the encodable range")]
    IntegerOutOfRange(i64),

    /// Length does not fit the 4-byte argument
    #[error("length {0} exceeds the encodable range")]
    LengthOverflow(usize),
}
