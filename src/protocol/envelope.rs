//! Sacred Mesh wire envelope
//!
//! An envelope is a codec map with exactly these fields, in this order:
//!
//! ```text
//! {
//!   "messageId":        bytes(16)   random per message
//!   "senderId":         text
//!   "ttlDeadline":      uint        unix seconds
//!   "hopsRemaining":    uint        decremented by each relay
//!   "encryptedPayload": bytes       sealed intent payload
//!   "nonce":            bytes(24)
//!   "authTag":          bytes(16)
//! }
//! ```
//!
//! The whole encoding must fit in [`MAX_PACKET_SIZE`] bytes. The payload is the
//! codec encoding of the intent message plus its recipient, sealed with
//! XChaCha20-Poly1305; the tag also covers `messageId`, `senderId` and
//! `ttlDeadline`.

use uuid::Uuid;

use super::{
    DecodeError, Error, IntentMessage, MAX_PACKET_SIZE, MAX_TTL_DEADLINE, MESSAGE_ID_LEN, MapView,
    Recipient, Result, ValidationError, Value, codec,
};
use crate::crypto::{self, MeshKey, NONCE_LEN, TAG_LEN};

/// 16-byte message identifier
pub type MessageId = [u8; MESSAGE_ID_LEN];

const FIELD_MESSAGE_ID: &str = "messageId";
const FIELD_SENDER_ID: &str = "senderId";
const FIELD_TTL_DEADLINE: &str = "ttlDeadline";
const FIELD_HOPS_REMAINING: &str = "hopsRemaining";
const FIELD_PAYLOAD: &str = "encryptedPayload";
const FIELD_NONCE: &str = "nonce";
const FIELD_AUTH_TAG: &str = "authTag";

// Payload keys are single letters to leave room for the note.
const PAYLOAD_SIGILS: &str = "s";
const PAYLOAD_STRENGTH: &str = "i";
const PAYLOAD_NOTE: &str = "n";
const PAYLOAD_TTL: &str = "t";
const PAYLOAD_HOP_LIMIT: &str = "h";
const PAYLOAD_RECIPIENT: &str = "r";

/// Decrypted contents of an envelope
#[derive(Debug, Clone, PartialEq)]
pub struct IntentPayload {
    /// The intent as the sender built it
    pub message: IntentMessage,
    /// Who the sender addressed it to
    pub recipient: Recipient,
}

impl IntentPayload {
    /// Codec form of the payload
    #[must_use]
    pub fn to_value(&self) -> Value {
        payload_value(&self.message, &self.recipient)
    }

    /// Parse and validate a decoded payload
    pub fn from_value(value: &Value) -> Result<Self> {
        let view = MapView::new(value, "payload")?;

        let sigils = view
            .array(PAYLOAD_SIGILS)?
            .iter()
            .map(|sigil| {
                sigil.as_str().map(str::to_owned).ok_or(DecodeError::InvalidField {
                    field: PAYLOAD_SIGILS,
                    reason: "expected text sigils",
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let intent_strength = view.float(PAYLOAD_STRENGTH)?;
        let note = match view.get(PAYLOAD_NOTE) {
            None => None,
            Some(_) => Some(view.text(PAYLOAD_NOTE)?.to_owned()),
        };
        let ttl = u32::try_from(view.uint(PAYLOAD_TTL)?).map_err(|_| DecodeError::InvalidField {
            field: PAYLOAD_TTL,
            reason: "out of range",
        })?;
        let hop_limit =
            u8::try_from(view.uint(PAYLOAD_HOP_LIMIT)?).map_err(|_| DecodeError::InvalidField {
                field: PAYLOAD_HOP_LIMIT,
                reason: "out of range",
            })?;
        let recipient = Recipient::from_value(view.required(PAYLOAD_RECIPIENT)?)?;

        let message = IntentMessage {
            sigils,
            intent_strength,
            note,
            ttl,
            hop_limit,
        };
        message.validate()?;
        recipient.validate()?;

        Ok(Self { message, recipient })
    }
}

fn payload_value(message: &IntentMessage, recipient: &Recipient) -> Value {
    let sigils = message
        .sigils
        .iter()
        .map(|sigil| Value::Text(sigil.clone()))
        .collect();

    let mut entries = Vec::with_capacity(6);
    entries.push((PAYLOAD_SIGILS.to_owned(), Value::Array(sigils)));
    entries.push((
        PAYLOAD_STRENGTH.to_owned(),
        Value::Float(message.intent_strength),
    ));
    if let Some(note) = &message.note {
        entries.push((PAYLOAD_NOTE.to_owned(), Value::Text(note.clone())));
    }
    entries.push((PAYLOAD_TTL.to_owned(), Value::from(message.ttl)));
    entries.push((PAYLOAD_HOP_LIMIT.to_owned(), Value::from(message.hop_limit)));
    entries.push((PAYLOAD_RECIPIENT.to_owned(), recipient.to_value()));
    Value::Map(entries)
}

/// One transmitted message
///
/// Only `hops_remaining` changes after construction, and only downwards via
/// [`WireEnvelope::relayed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEnvelope {
    message_id: MessageId,
    sender_id: String,
    ttl_deadline: u64,
    hops_remaining: u8,
    encrypted_payload: Vec<u8>,
    nonce: [u8; NONCE_LEN],
    auth_tag: [u8; TAG_LEN],
}

/// Validate, stamp and seal a message for the wire
///
/// Generates a fresh random message id, sets `ttl_deadline = now + ttl` and
/// `hops_remaining = hop_limit`, then encrypts the payload under `key`.
///
/// # Errors
///
/// Returns [`Error::Validation`] for an invalid message or recipient, including
/// a TTL whose deadline would not fit the wire's 4-byte integers.
pub fn build_envelope(
    message: &IntentMessage,
    recipient: &Recipient,
    sender_id: &str,
    key: &MeshKey,
    now: u64,
) -> Result<WireEnvelope> {
    message.validate()?;
    recipient.validate()?;

    let ttl_deadline = now.saturating_add(u64::from(message.ttl));
    if ttl_deadline > MAX_TTL_DEADLINE {
        return Err(ValidationError::DeadlineOutOfRange {
            deadline: ttl_deadline,
            max: MAX_TTL_DEADLINE,
        }
        .into());
    }

    let message_id = *Uuid::new_v4().as_bytes();

    let plaintext = codec::encode(&payload_value(message, recipient))?;
    let aad = associated_data(&message_id, sender_id, ttl_deadline);
    let sealed = crypto::encrypt(&plaintext, key, &aad)?;

    Ok(WireEnvelope {
        message_id,
        sender_id: sender_id.to_owned(),
        ttl_deadline,
        hops_remaining: message.hop_limit,
        encrypted_payload: sealed.ciphertext,
        nonce: sealed.nonce,
        auth_tag: sealed.tag,
    })
}

/// Parse an envelope from wire bytes
pub fn parse_envelope(bytes: &[u8]) -> Result<WireEnvelope> {
    WireEnvelope::parse(bytes)
}

fn associated_data(message_id: &MessageId, sender_id: &str, ttl_deadline: u64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(MESSAGE_ID_LEN + sender_id.len() + 8);
    aad.extend_from_slice(message_id);
    aad.extend_from_slice(sender_id.as_bytes());
    aad.extend_from_slice(&ttl_deadline.to_be_bytes());
    aad
}

impl WireEnvelope {
    /// Get message ID
    #[must_use]
    pub const fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Get sender ID
    #[must_use]
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Absolute expiry, unix seconds
    #[must_use]
    pub const fn ttl_deadline(&self) -> u64 {
        self.ttl_deadline
    }

    /// Relays left before the message stops travelling
    #[must_use]
    pub const fn hops_remaining(&self) -> u8 {
        self.hops_remaining
    }

    /// Sealed payload bytes
    #[must_use]
    pub fn encrypted_payload(&self) -> &[u8] {
        &self.encrypted_payload
    }

    /// Encryption nonce
    #[must_use]
    pub const fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Authentication tag
    #[must_use]
    pub const fn auth_tag(&self) -> &[u8; TAG_LEN] {
        &self.auth_tag
    }

    /// Check whether the deadline has passed at `now`
    #[must_use]
    pub const fn is_expired(&self, now: u64) -> bool {
        now > self.ttl_deadline
    }

    /// Copy of this envelope with one hop consumed, or `None` when no hops remain
    #[must_use]
    pub fn relayed(&self) -> Option<Self> {
        let hops_remaining = self.hops_remaining.checked_sub(1)?;
        Some(Self {
            hops_remaining,
            ..self.clone()
        })
    }

    /// Decrypt and decode the payload
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if the tag does not verify under `key`,
    /// and a decode or validation error if the plaintext is not a valid payload.
    pub fn open(&self, key: &MeshKey) -> Result<IntentPayload> {
        let aad = associated_data(&self.message_id, &self.sender_id, self.ttl_deadline);
        let plaintext = crypto::decrypt(
            &self.encrypted_payload,
            &self.nonce,
            &self.auth_tag,
            key,
            &aad,
        )?;
        IntentPayload::from_value(&codec::decode(&plaintext)?)
    }

    /// Codec form of the envelope
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Map(vec![
            (
                FIELD_MESSAGE_ID.to_owned(),
                Value::Bytes(self.message_id.to_vec()),
            ),
            (
                FIELD_SENDER_ID.to_owned(),
                Value::Text(self.sender_id.clone()),
            ),
            (
                FIELD_TTL_DEADLINE.to_owned(),
                Value::Int(i64::try_from(self.ttl_deadline).unwrap_or(i64::MAX)),
            ),
            (
                FIELD_HOPS_REMAINING.to_owned(),
                Value::from(self.hops_remaining),
            ),
            (
                FIELD_PAYLOAD.to_owned(),
                Value::Bytes(self.encrypted_payload.clone()),
            ),
            (FIELD_NONCE.to_owned(), Value::Bytes(self.nonce.to_vec())),
            (FIELD_AUTH_TAG.to_owned(), Value::Bytes(self.auth_tag.to_vec())),
        ])
    }

    /// Encode for the wire
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if the encoding exceeds
    /// [`MAX_PACKET_SIZE`]; nothing should be transmitted in that case.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let bytes = codec::encode(&self.to_value())?;
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(Error::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_PACKET_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Decode from wire bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] on malformed input, oversized frames, missing
    /// fields, or fields of the wrong type or length.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(DecodeError::Oversized {
                size: bytes.len(),
                max: MAX_PACKET_SIZE,
            }
            .into());
        }

        let value = codec::decode(bytes)?;
        let view = MapView::new(&value, "envelope")?;

        let hops_remaining = u8::try_from(view.uint(FIELD_HOPS_REMAINING)?).map_err(|_| {
            DecodeError::InvalidField {
                field: FIELD_HOPS_REMAINING,
                reason: "out of range",
            }
        })?;

        Ok(Self {
            message_id: view.byte_array(FIELD_MESSAGE_ID)?,
            sender_id: view.text(FIELD_SENDER_ID)?.to_owned(),
            ttl_deadline: view.uint(FIELD_TTL_DEADLINE)?,
            hops_remaining,
            encrypted_payload: view.bytes(FIELD_PAYLOAD)?.to_vec(),
            nonce: view.byte_array(FIELD_NONCE)?,
            auth_tag: view.byte_array(FIELD_AUTH_TAG)?,
        })
    }
}
