//! Bounded memory of recently seen message ids.

use std::collections::{BTreeSet, HashMap};

use crate::protocol::MessageId;

/// Remembers each message id until its own deadline passes.
///
/// Past the deadline the TTL check rejects the message anyway, so the id can
/// be forgotten. When full, the id closest to expiry is evicted first.
#[derive(Debug)]
pub struct DedupCache {
    deadlines: HashMap<MessageId, u64>,
    by_expiry: BTreeSet<(u64, MessageId)>,
    capacity: usize,
}

impl DedupCache {
    /// Create a cache holding at most `capacity` ids (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            deadlines: HashMap::new(),
            by_expiry: BTreeSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Whether `id` was recorded and has not yet been pruned.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.deadlines.contains_key(id)
    }

    /// Remember `id` until `deadline`. Returns false if it was already known.
    pub fn insert(&mut self, id: MessageId, deadline: u64, now: u64) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.prune_expired(now);
        if self.deadlines.len() >= self.capacity {
            if let Some(oldest) = self.by_expiry.pop_first() {
                self.deadlines.remove(&oldest.1);
            }
        }
        self.deadlines.insert(id, deadline);
        self.by_expiry.insert((deadline, id));
        true
    }

    /// Forget ids whose deadline is before `now`.
    pub fn prune_expired(&mut self, now: u64) {
        while let Some(&(deadline, id)) = self.by_expiry.first() {
            if deadline >= now {
                break;
            }
            self.by_expiry.pop_first();
            self.deadlines.remove(&id);
        }
    }

    /// Number of ids currently remembered
    #[must_use]
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Whether no id is remembered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
