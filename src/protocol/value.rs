//! Dynamically typed wire values

use std::fmt;

use super::DecodeError;

/// A value the codec can carry.
///
/// Maps keep their entries in insertion order and only allow text keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer (wire range is `-2^32 ..= 2^32 - 1`)
    Int(i64),
    /// Single-precision float
    Float(f32),
    /// UTF-8 text
    Text(String),
    /// Raw byte string
    Bytes(Vec<u8>),
    /// Ordered array
    Array(Vec<Value>),
    /// Insertion-ordered, text-keyed map
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }

    /// Check for null
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow as text
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Borrow as a byte string
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Integer value, if any
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Non-negative integer value, if any
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|value| u64::try_from(value).ok())
    }

    /// Float value, if any
    #[must_use]
    pub const fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Borrow as an array
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as map entries
    #[must_use]
    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up the first entry with `key` when this is a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Bytes(bytes) => write!(f, "h'{}'", hex(bytes)),
            Self::Array(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

/// Typed field access over a decoded map.
///
/// Every accessor maps a missing or mistyped field to a [`DecodeError`].
#[derive(Debug, Clone, Copy)]
pub struct MapView<'a> {
    entries: &'a [(String, Value)],
}

impl<'a> MapView<'a> {
    /// Wrap a value that must be a map.
    pub fn new(value: &'a Value, what: &'static str) -> Result<Self, DecodeError> {
        let entries = value.as_map().ok_or(DecodeError::InvalidField {
            field: what,
            reason: "expected a map",
        })?;
        Ok(Self { entries })
    }

    /// Optional field lookup.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Required field lookup.
    pub fn required(&self, field: &'static str) -> Result<&'a Value, DecodeError> {
        self.get(field).ok_or(DecodeError::MissingField(field))
    }

    /// Required text field.
    pub fn text(&self, field: &'static str) -> Result<&'a str, DecodeError> {
        self.required(field)?
            .as_str()
            .ok_or(DecodeError::InvalidField {
                field,
                reason: "expected text",
            })
    }

    /// Required byte string field.
    pub fn bytes(&self, field: &'static str) -> Result<&'a [u8], DecodeError> {
        self.required(field)?
            .as_bytes()
            .ok_or(DecodeError::InvalidField {
                field,
                reason: "expected bytes",
            })
    }

    /// Required byte string field of exactly `N` bytes.
    pub fn byte_array<const N: usize>(&self, field: &'static str) -> Result<[u8; N], DecodeError> {
        self.bytes(field)?
            .try_into()
            .map_err(|_| DecodeError::InvalidField {
                field,
                reason: "unexpected length",
            })
    }

    /// Required unsigned integer field.
    pub fn uint(&self, field: &'static str) -> Result<u64, DecodeError> {
        self.required(field)?
            .as_u64()
            .ok_or(DecodeError::InvalidField {
                field,
                reason: "expected unsigned integer",
            })
    }

    /// Required float field.
    pub fn float(&self, field: &'static str) -> Result<f32, DecodeError> {
        self.required(field)?
            .as_f32()
            .ok_or(DecodeError::InvalidField {
                field,
                reason: "expected float",
            })
    }

    /// Required array field.
    pub fn array(&self, field: &'static str) -> Result<&'a [Value], DecodeError> {
        self.required(field)?
            .as_array()
            .ok_or(DecodeError::InvalidField {
                field,
                reason: "expected array",
            })
    }
}
