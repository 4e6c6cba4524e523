//! Inbound routing: parse, dedup, expiry, decrypt, then relay and/or deliver.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::DedupCache;
use crate::crypto::KeyProvider;
use crate::protocol::{Error, IntentMessage, IntentPayload, Recipient, WireEnvelope};

/// Why an inbound frame went nowhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Frame or payload did not decode
    Malformed,
    /// Message id already processed
    Duplicate,
    /// Frame carries this node's own sender id
    OwnMessage,
    /// Deadline already passed
    Expired,
    /// No candidate key authenticated the payload
    Unauthenticated,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Malformed => "malformed",
            Self::Duplicate => "duplicate",
            Self::OwnMessage => "own message",
            Self::Expired => "expired",
            Self::Unauthenticated => "unauthenticated",
        };
        f.write_str(reason)
    }
}

/// A message accepted for local delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Decrypted intent
    pub message: IntentMessage,
    /// Who sent it
    pub sender_id: String,
    /// How it was addressed
    pub recipient: Recipient,
}

/// What to do with one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Frame is discarded
    Dropped(DropReason),
    /// Frame authenticated and was recorded as seen
    Accepted {
        /// Present when subscribers should see the message
        delivery: Option<Delivery>,
        /// Serialized envelope with one hop consumed, when it should travel on
        relay: Option<Vec<u8>>,
    },
}

/// Single-writer routing state of one mesh.
///
/// Owned by the dispatcher task, so dedup lookups, inserts and relay decisions
/// never interleave.
pub struct Dispatcher {
    local_id: String,
    circles: Vec<String>,
    keys: Arc<dyn KeyProvider>,
    dedup: DedupCache,
}

impl Dispatcher {
    /// Create routing state for `local_id`.
    #[must_use]
    pub fn new(
        local_id: impl Into<String>,
        circles: Vec<String>,
        keys: Arc<dyn KeyProvider>,
        dedup_capacity: usize,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            circles,
            keys,
            dedup: DedupCache::new(dedup_capacity),
        }
    }

    /// Number of message ids currently remembered
    #[must_use]
    pub fn seen(&self) -> usize {
        self.dedup.len()
    }

    /// Route one frame that arrived on `origin` at `now`.
    pub fn process(&mut self, bytes: &[u8], origin: &str, now: u64) -> Disposition {
        let envelope = match WireEnvelope::parse(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(origin, error = %err, len = bytes.len(), "dropping malformed frame");
                return Disposition::Dropped(DropReason::Malformed);
            }
        };

        if self.dedup.contains(envelope.message_id()) {
            trace!(origin, "dropping duplicate");
            return Disposition::Dropped(DropReason::Duplicate);
        }
        if envelope.sender_id() == self.local_id {
            trace!(origin, "dropping own message");
            return Disposition::Dropped(DropReason::OwnMessage);
        }
        if envelope.is_expired(now) {
            debug!(
                origin,
                deadline = envelope.ttl_deadline(),
                now,
                "dropping expired message"
            );
            return Disposition::Dropped(DropReason::Expired);
        }

        let payload = match self.open(&envelope) {
            Ok(payload) => payload,
            Err(reason) => {
                if reason == DropReason::Malformed {
                    self.remember(&envelope, now);
                }
                return Disposition::Dropped(reason);
            }
        };
        self.remember(&envelope, now);

        let relay = if payload.recipient.is_peer(&self.local_id) {
            None
        } else {
            envelope.relayed().and_then(|next| match next.serialize() {
                Ok(frame) => Some(frame),
                Err(err) => {
                    warn!(error = %err, "relay copy failed to serialize");
                    None
                }
            })
        };

        let addressed_here = match &payload.recipient {
            Recipient::Broadcast => true,
            Recipient::Peer(id) => *id == self.local_id,
            Recipient::Circle(group) => self.circles.iter().any(|c| c == group),
        };
        let delivery = addressed_here.then(|| Delivery {
            message: payload.message,
            sender_id: envelope.sender_id().to_owned(),
            recipient: payload.recipient,
        });

        debug!(
            origin,
            sender = envelope.sender_id(),
            hops = envelope.hops_remaining(),
            deliver = delivery.is_some(),
            relay = relay.is_some(),
            "accepted message"
        );
        Disposition::Accepted { delivery, relay }
    }

    fn open(&self, envelope: &WireEnvelope) -> Result<IntentPayload, DropReason> {
        for key in self.keys.inbound_keys(envelope.sender_id()) {
            match envelope.open(&key) {
                Ok(payload) => return Ok(payload),
                Err(Error::Authentication) => {}
                Err(err) => {
                    warn!(sender = envelope.sender_id(), error = %err, "authenticated payload is invalid");
                    return Err(DropReason::Malformed);
                }
            }
        }
        debug!(sender = envelope.sender_id(), "no key authenticated message");
        Err(DropReason::Unauthenticated)
    }

    fn remember(&mut self, envelope: &WireEnvelope, now: u64) {
        self.dedup
            .insert(*envelope.message_id(), envelope.ttl_deadline(), now);
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("local_id", &self.local_id)
            .field("circles", &self.circles)
            .field("seen", &self.dedup.len())
            .finish_non_exhaustive()
    }
}
