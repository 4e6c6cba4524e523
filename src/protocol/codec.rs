//! Sacred Mesh value codec (encode/decode)
//!
//! A compact CBOR-like encoding. Every item starts with one byte holding a
//! 3-bit major type and 5 bits of additional information:
//!
//! ```text
//!  7   6   5   4   3   2   1   0
//! +---+---+---+---+---+---+---+---+
//! |   major   |    additional     |
//! +---+---+---+---+---+---+---+---+
//! ```
//!
//! Arguments below 24 live in the additional bits; 24, 25 and 26 select a
//! 1-, 2- or 4-byte big-endian extension. Floats are always written as IEEE-754
//! single precision, so values round-trip with f32 precision only. Map keys are
//! written in insertion order; there is no canonical sort.

use super::{DecodeError, EncodeError, Value};

const MAJOR_UINT: u8 = 0;
const MAJOR_NEGINT: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_SIMPLE: u8 = 7;

const ARG_U8: u8 = 24;
const ARG_U16: u8 = 25;
const ARG_U32: u8 = 26;

const SIMPLE_FALSE: u8 = 20;
const SIMPLE_TRUE: u8 = 21;
const SIMPLE_NULL: u8 = 22;
const SIMPLE_FLOAT32: u8 = 26;

/// Maximum array/map nesting accepted by the decoder.
const MAX_DEPTH: usize = 32;

/// Encode a value to bytes
///
/// # Errors
///
/// Returns an error if an integer or a length does not fit the 4-byte argument.
pub fn encode(value: &Value) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(64);
    encode_into(value, &mut out)?;
    Ok(out)
}

/// Append the encoding of `value` to `out`
pub fn encode_into(value: &Value, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    match value {
        Value::Null => out.push(initial(MAJOR_SIMPLE, SIMPLE_NULL)),
        Value::Bool(false) => out.push(initial(MAJOR_SIMPLE, SIMPLE_FALSE)),
        Value::Bool(true) => out.push(initial(MAJOR_SIMPLE, SIMPLE_TRUE)),
        Value::Int(number) => {
            // Negative n travels as the magnitude -1 - n, which is !n.
            let (major, magnitude) = if *number >= 0 {
                (MAJOR_UINT, *number)
            } else {
                (MAJOR_NEGINT, !*number)
            };
            let argument = u32::try_from(magnitude)
                .map_err(|_| EncodeError::IntegerOutOfRange(*number))?;
            write_head(major, argument, out);
        }
        Value::Float(number) => {
            out.push(initial(MAJOR_SIMPLE, SIMPLE_FLOAT32));
            out.extend_from_slice(&number.to_be_bytes());
        }
        Value::Text(text) => {
            write_head(MAJOR_TEXT, length(text.len())?, out);
            out.extend_from_slice(text.as_bytes());
        }
        Value::Bytes(bytes) => {
            write_head(MAJOR_BYTES, length(bytes.len())?, out);
            out.extend_from_slice(bytes);
        }
        Value::Array(items) => {
            write_head(MAJOR_ARRAY, length(items.len())?, out);
            for item in items {
                encode_into(item, out)?;
            }
        }
        Value::Map(entries) => {
            write_head(MAJOR_MAP, length(entries.len())?, out);
            for (key, item) in entries {
                write_head(MAJOR_TEXT, length(key.len())?, out);
                out.extend_from_slice(key.as_bytes());
                encode_into(item, out)?;
            }
        }
    }
    Ok(())
}

/// Decode a single value that spans all of `bytes`
///
/// # Errors
///
/// Returns an error if:
/// - Input is truncated
/// - A major type, simple value or length width is unsupported
/// - Text is not valid UTF-8 or a map key is not text
/// - Nesting is too deep
/// - Bytes remain after the value
pub fn decode(bytes: &[u8]) -> Result<Value, DecodeError> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.value(0)?;
    let remaining = decoder.remaining();
    if remaining != 0 {
        return Err(DecodeError::TrailingBytes { count: remaining });
    }
    Ok(value)
}

const fn initial(major: u8, additional: u8) -> u8 {
    (major << 5) | additional
}

fn length(len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::LengthOverflow(len))
}

#[allow(clippy::cast_possible_truncation)]
fn write_head(major: u8, argument: u32, out: &mut Vec<u8>) {
    match argument {
        0..=23 => out.push(initial(major, argument as u8)),
        24..=0xFF => {
            out.push(initial(major, ARG_U8));
            out.push(argument as u8);
        }
        0x100..=0xFFFF => {
            out.push(initial(major, ARG_U16));
            out.extend_from_slice(&(argument as u16).to_be_bytes());
        }
        _ => {
            out.push(initial(major, ARG_U32));
            out.extend_from_slice(&argument.to_be_bytes());
        }
    }
}

struct Decoder<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    const fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        if count > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed: count - self.remaining(),
            });
        }
        let slice = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take_array::<1>()?[0])
    }

    fn argument(&mut self, additional: u8) -> Result<u32, DecodeError> {
        match additional {
            0..=23 => Ok(u32::from(additional)),
            ARG_U8 => Ok(u32::from(self.read_u8()?)),
            ARG_U16 => Ok(u32::from(u16::from_be_bytes(self.take_array()?))),
            ARG_U32 => Ok(u32::from_be_bytes(self.take_array()?)),
            _ => Err(DecodeError::UnsupportedLength(additional)),
        }
    }

    fn length(&mut self, additional: u8) -> Result<usize, DecodeError> {
        let argument = self.argument(additional)?;
        // Lengths past the address space can never be satisfied; `take` reports them.
        Ok(usize::try_from(argument).unwrap_or(usize::MAX))
    }

    /// Item count for an array or map; every item needs at least `min_item` bytes.
    fn count(&mut self, additional: u8, min_item: usize) -> Result<usize, DecodeError> {
        let count = self.length(additional)?;
        let needed = count.saturating_mul(min_item);
        if needed > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed: needed - self.remaining(),
            });
        }
        Ok(count)
    }

    fn text(&mut self, additional: u8) -> Result<String, DecodeError> {
        let len = self.length(additional)?;
        let start = self.offset;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { offset: start })
    }

    fn value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        let byte = self.read_u8()?;
        let major = byte >> 5;
        let additional = byte & 0x1f;

        match major {
            MAJOR_UINT => Ok(Value::Int(i64::from(self.argument(additional)?))),
            MAJOR_NEGINT => Ok(Value::Int(-1 - i64::from(self.argument(additional)?))),
            MAJOR_BYTES => {
                let len = self.length(additional)?;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            MAJOR_TEXT => Ok(Value::Text(self.text(additional)?)),
            MAJOR_ARRAY => {
                let depth = Self::nested(depth)?;
                let count = self.count(additional, 1)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.value(depth)?);
                }
                Ok(Value::Array(items))
            }
            MAJOR_MAP => {
                let depth = Self::nested(depth)?;
                let count = self.count(additional, 2)?;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key_offset = self.offset;
                    let key_byte = self.read_u8()?;
                    if key_byte >> 5 != MAJOR_TEXT {
                        return Err(DecodeError::NonTextKey { offset: key_offset });
                    }
                    let key = self.text(key_byte & 0x1f)?;
                    let item = self.value(depth)?;
                    entries.push((key, item));
                }
                Ok(Value::Map(entries))
            }
            MAJOR_SIMPLE => match additional {
                SIMPLE_FALSE => Ok(Value::Bool(false)),
                SIMPLE_TRUE => Ok(Value::Bool(true)),
                SIMPLE_NULL => Ok(Value::Null),
                SIMPLE_FLOAT32 => Ok(Value::Float(f32::from_be_bytes(self.take_array()?))),
                other => Err(DecodeError::UnsupportedSimple(other)),
            },
            other => Err(DecodeError::UnknownMajorType(other)),
        }
    }

    const fn nested(depth: usize) -> Result<usize, DecodeError> {
        if depth >= MAX_DEPTH {
            return Err(DecodeError::DepthExceeded { max: MAX_DEPTH });
        }
        Ok(depth + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &Value) -> Value {
        decode(&encode(value).unwrap()).unwrap()
    }

    #[test]
    fn test_encode_known_vectors() {
        let cases: Vec<(Value, Vec<u8>)> = vec![
            (Value::Int(0), vec![0x00]),
            (Value::Int(23), vec![0x17]),
            (Value::Int(24), vec![0x18, 0x18]),
            (Value::Int(100), vec![0x18, 0x64]),
            (Value::Int(1000), vec![0x19, 0x03, 0xe8]),
            (Value::Int(1_000_000), vec![0x1a, 0x00, 0x0f, 0x42, 0x40]),
            (Value::Int(-1), vec![0x20]),
            (Value::Int(-100), vec![0x38, 0x63]),
            (Value::Bool(false), vec![0xf4]),
            (Value::Bool(true), vec![0xf5]),
            (Value::Null, vec![0xf6]),
            (Value::Float(1.0), vec![0xfa, 0x3f, 0x80, 0x00, 0x00]),
            (Value::Text("a".into()), vec![0x61, 0x61]),
            (Value::Bytes(vec![1, 2]), vec![0x42, 0x01, 0x02]),
            (
                Value::Array(vec![Value::Int(1), Value::Int(2)]),
                vec![0x82, 0x01, 0x02],
            ),
            (
                Value::Map(vec![("a".into(), Value::Int(1))]),
                vec![0xa1, 0x61, 0x61, 0x01],
            ),
        ];

        for (value, expected) in cases {
            let encoded = encode(&value).unwrap();
            assert_eq!(encoded, expected, "encoding {value}");
            assert_eq!(decode(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn test_integer_bounds() {
        let max = i64::from(u32::MAX);
        assert_eq!(roundtrip(&Value::Int(max)), Value::Int(max));
        assert_eq!(roundtrip(&Value::Int(-1 - max)), Value::Int(-1 - max));

        assert_eq!(
            encode(&Value::Int(max + 1)),
            Err(EncodeError::IntegerOutOfRange(max + 1))
        );
        assert_eq!(
            encode(&Value::Int(-2 - max)),
            Err(EncodeError::IntegerOutOfRange(-2 - max))
        );
    }

    #[test]
    fn test_long_lengths_escalate() {
        let text = "x".repeat(300);
        let encoded = encode(&Value::Text(text.clone())).unwrap();
        assert_eq!(&encoded[..3], &[0x79, 0x01, 0x2c]);
        assert_eq!(decode(&encoded).unwrap(), Value::Text(text));
    }

    #[test]
    fn test_map_preserves_insertion_order() {
        let value = Value::Map(vec![
            ("zeta".into(), Value::Int(1)),
            ("alpha".into(), Value::Int(2)),
        ]);
        let Value::Map(entries) = roundtrip(&value) else {
            panic!("expected map");
        };
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["zeta", "alpha"]);
    }

    #[test]
    fn test_float_is_single_precision() {
        let Value::Float(decoded) = roundtrip(&Value::Float(0.8)) else {
            panic!("expected float");
        };
        assert_eq!(decoded, 0.8_f32);
        assert!((f64::from(decoded) - 0.8).abs() < f64::from(f32::EPSILON));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(decode(&[]), Err(DecodeError::Truncated { .. })));
        assert!(matches!(decode(&[0x19, 0x01]), Err(DecodeError::Truncated { .. })));
        assert!(matches!(decode(&[0x63, b'a']), Err(DecodeError::Truncated { .. })));
        assert!(matches!(decode(&[0xfa, 0x3f]), Err(DecodeError::Truncated { .. })));
        // Array claims far more items than bytes available.
        assert!(matches!(
            decode(&[0x9a, 0xff, 0xff, 0xff, 0xff]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_unknown_major_type() {
        assert_eq!(decode(&[0xc0]), Err(DecodeError::UnknownMajorType(6)));
    }

    #[test]
    fn test_decode_unsupported_simple() {
        assert_eq!(decode(&[0xf7]), Err(DecodeError::UnsupportedSimple(23)));
        // Double-precision floats are outside the codec.
        assert_eq!(
            decode(&[0xfb, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(DecodeError::UnsupportedSimple(27))
        );
    }

    #[test]
    fn test_decode_unsupported_length() {
        assert_eq!(
            decode(&[0x1b, 0, 0, 0, 0, 0, 0, 0, 1]),
            Err(DecodeError::UnsupportedLength(27))
        );
        assert_eq!(decode(&[0x5f]), Err(DecodeError::UnsupportedLength(31)));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        assert_eq!(
            decode(&[0x62, 0xff, 0xfe]),
            Err(DecodeError::InvalidUtf8 { offset: 1 })
        );
    }

    #[test]
    fn test_decode_non_text_key() {
        assert_eq!(
            decode(&[0xa1, 0x01, 0x02]),
            Err(DecodeError::NonTextKey { offset: 1 })
        );
    }

    #[test]
    fn test_decode_trailing_bytes() {
        assert_eq!(
            decode(&[0x01, 0x02]),
            Err(DecodeError::TrailingBytes { count: 1 })
        );
    }

    #[test]
    fn test_decode_depth_limit() {
        let nested = vec![0x81; MAX_DEPTH + 1];
        assert_eq!(
            decode(&nested),
            Err(DecodeError::DepthExceeded { max: MAX_DEPTH })
        );

        let mut shallow = vec![0x81; MAX_DEPTH];
        shallow.push(0xf6);
        assert!(decode(&shallow).is_ok());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn value_strategy() -> impl Strategy<Value = Value> {
            let max = i64::from(u32::MAX);
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                (-1 - max..=max).prop_map(Value::Int),
                (-1.0e6f32..1.0e6f32).prop_map(Value::Float),
                ".{0,40}".prop_map(Value::Text),
                prop::collection::vec(any::<u8>(), 0..300).prop_map(Value::Bytes),
            ];
            leaf.prop_recursive(4, 64, 8, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                    prop::collection::vec(("[a-zA-Z]{0,12}", inner), 0..8).prop_map(Value::Map),
                ]
            })
        }

        proptest! {
            /// Property: Any supported value should roundtrip exactly
            #[test]
            fn prop_roundtrip_preserves_value(value in value_strategy()) {
                let encoded = encode(&value).unwrap();
                prop_assert_eq!(decode(&encoded).unwrap(), value);
            }

            /// Property: Every strict prefix of an encoding is rejected
            #[test]
            fn prop_truncation_detected(value in value_strategy(), cut in 0.0f64..1.0) {
                let encoded = encode(&value).unwrap();
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
                let len = (encoded.len() as f64 * cut) as usize;
                prop_assert!(decode(&encoded[..len]).is_err());
            }

            /// Property: Arbitrary input never panics the decoder
            #[test]
            fn prop_decode_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
                let _ = decode(&bytes);
            }
        }
    }
}
