//! Offline store-and-forward queue.

use std::collections::VecDeque;

use bytes::Bytes;

use super::OverflowPolicy;
use crate::protocol::{Error, MessageId, Result};

/// One sealed envelope waiting for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Serialized envelope
    pub bytes: Bytes,
    /// Envelope message id
    pub message_id: MessageId,
    /// Envelope deadline, unix seconds
    pub ttl_deadline: u64,
    /// When the entry was queued, unix seconds
    pub enqueued_at: u64,
    /// Flush attempts so far
    pub attempts: u32,
}

impl QueueEntry {
    /// Wrap freshly serialized envelope bytes.
    #[must_use]
    pub fn new(bytes: Bytes, message_id: MessageId, ttl_deadline: u64, now: u64) -> Self {
        Self {
            bytes,
            message_id,
            ttl_deadline,
            enqueued_at: now,
            attempts: 0,
        }
    }

    /// Whether resending would be pointless at `now`
    #[must_use]
    pub const fn is_expired(&self, now: u64) -> bool {
        now > self.ttl_deadline
    }
}

/// Depth and age of the outbound queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueStats {
    /// Entries waiting
    pub size: usize,
    /// Seconds the front entry has waited, if any
    pub oldest_age: Option<u64>,
}

/// Bounded FIFO of envelopes built while no transport was active.
#[derive(Debug)]
pub struct OutboundQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            policy,
        }
    }

    /// Append an entry.
    ///
    /// Under [`OverflowPolicy::DropOldest`] a full queue gives up its front entry,
    /// which is returned. Under [`OverflowPolicy::RejectNew`] the call fails.
    pub fn push(&mut self, entry: QueueEntry) -> Result<Option<QueueEntry>> {
        if self.capacity == 0 {
            return Err(Error::QueueOverflow { capacity: 0 });
        }
        let mut dropped = None;
        if self.entries.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::DropOldest => dropped = self.entries.pop_front(),
                OverflowPolicy::RejectNew => {
                    return Err(Error::QueueOverflow {
                        capacity: self.capacity,
                    });
                }
            }
        }
        self.entries.push_back(entry);
        Ok(dropped)
    }

    /// Change what happens when the queue is full.
    pub fn set_policy(&mut self, policy: OverflowPolicy) {
        self.policy = policy;
    }

    /// Take the front entry.
    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Put an entry back at the front after a failed send.
    ///
    /// Returns it unchanged when the queue filled up in the meantime.
    pub fn requeue_front(&mut self, entry: QueueEntry) -> Option<QueueEntry> {
        if self.entries.len() >= self.capacity {
            return Some(entry);
        }
        self.entries.push_front(entry);
        None
    }

    /// Drop every entry whose deadline has passed. Returns how many went.
    pub fn discard_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries waiting
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Depth and age of the front entry at `now`
    #[must_use]
    pub fn stats(&self, now: u64) -> QueueStats {
        QueueStats {
            size: self.entries.len(),
            oldest_age: self
                .entries
                .front()
                .map(|entry| now.saturating_sub(entry.enqueued_at)),
        }
    }
}
