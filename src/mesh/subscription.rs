//! Subscriber registry for delivered messages.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use crate::protocol::IntentMessage;

type Callback = Arc<dyn Fn(&IntentMessage, &str) + Send + Sync>;

enum Subscriber {
    Callback(Callback),
    Channel(UnboundedSender<(IntentMessage, String)>),
}

#[derive(Default)]
pub(crate) struct SubscriberSet {
    entries: Mutex<Vec<(u64, Subscriber)>>,
    next_id: AtomicU64,
}

impl SubscriberSet {
    pub(crate) fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&IntentMessage, &str) + Send + Sync + 'static,
    {
        let id = self.insert(Subscriber::Callback(Arc::new(callback)));
        Subscription {
            id,
            set: Arc::downgrade(self),
            armed: true,
        }
    }

    pub(crate) fn stream(&self) -> MessageStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.insert(Subscriber::Channel(tx));
        MessageStream { rx }
    }

    fn insert(&self, subscriber: Subscriber) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, subscriber));
        id
    }

    fn remove(&self, id: u64) {
        self.entries.lock().retain(|(entry, _)| *entry != id);
    }

    /// Hand a message to every subscriber. Returns how many received it.
    pub(crate) fn deliver(&self, message: &IntentMessage, sender_id: &str) -> usize {
        let (callbacks, channels): (Vec<_>, Vec<_>) = {
            let mut entries = self.entries.lock();
            entries.retain(|(_, subscriber)| match subscriber {
                Subscriber::Channel(tx) => !tx.is_closed(),
                Subscriber::Callback(_) => true,
            });
            let callbacks = entries
                .iter()
                .filter_map(|(_, s)| match s {
                    Subscriber::Callback(cb) => Some(Arc::clone(cb)),
                    Subscriber::Channel(_) => None,
                })
                .collect();
            let channels = entries
                .iter()
                .filter_map(|(_, s)| match s {
                    Subscriber::Channel(tx) => Some(tx.clone()),
                    Subscriber::Callback(_) => None,
                })
                .collect();
            (callbacks, channels)
        };

        let mut reached = 0;
        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(message, sender_id))) {
                Ok(()) => reached += 1,
                Err(_) => warn!(sender = sender_id, "message subscriber panicked"),
            }
        }
        for tx in channels {
            if tx.send((message.clone(), sender_id.to_owned())).is_ok() {
                reached += 1;
            }
        }
        reached
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Handle for a callback registered with
/// [`SacredMesh::on_message`](super::SacredMesh::on_message).
///
/// Dropping it unsubscribes. Use [`Subscription::detach`] to keep the callback
/// for the mesh's lifetime.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    set: Weak<SubscriberSet>,
    armed: bool,
}

impl Subscription {
    /// Unsubscribe now.
    pub fn cancel(self) {
        drop(self);
    }

    /// Keep the callback registered after this handle is dropped.
    pub fn detach(mut self) {
        self.armed = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(set) = self.set.upgrade() {
            set.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Channel of `(message, sender_id)` pairs from
/// [`SacredMesh::messages`](super::SacredMesh::messages).
///
/// Ends once the mesh shuts down.
#[derive(Debug)]
pub struct MessageStream {
    rx: UnboundedReceiver<(IntentMessage, String)>,
}

impl MessageStream {
    /// Wait for the next delivered message.
    pub async fn recv(&mut self) -> Option<(IntentMessage, String)> {
        self.rx.recv().await
    }

    /// Take a delivered message if one is ready.
    pub fn try_recv(&mut self) -> Option<(IntentMessage, String)> {
        self.rx.try_recv().ok()
    }
}

impl Stream for MessageStream {
    type Item = (IntentMessage, String);

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn message() -> IntentMessage {
        IntentMessage::new(["harmony"], 0.5)
    }

    fn counter(set: &Arc<SubscriberSet>) -> (Arc<AtomicUsize>, Subscription) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let sub = set.subscribe(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hits, sub)
    }

    #[test]
    fn test_drop_and_cancel_unsubscribe() {
        let set = Arc::new(SubscriberSet::default());
        let (a_hits, a) = counter(&set);
        let (b_hits, b) = counter(&set);

        assert_eq!(set.deliver(&message(), "alice"), 2);
        a.cancel();
        assert_eq!(set.deliver(&message(), "alice"), 1);
        drop(b);
        assert_eq!(set.deliver(&message(), "alice"), 0);

        assert_eq!(a_hits.load(Ordering::SeqCst), 1);
        assert_eq!(b_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_detach_keeps_callback() {
        let set = Arc::new(SubscriberSet::default());
        let (hits, sub) = counter(&set);
        sub.detach();
        set.deliver(&message(), "alice");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let set = Arc::new(SubscriberSet::default());
        let _bad = set.subscribe(|_, _| panic!("boom"));
        let (hits, _good) = counter(&set);

        assert_eq!(set.deliver(&message(), "alice"), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_receives_and_ends() {
        let set = Arc::new(SubscriberSet::default());
        let mut stream = set.stream();

        set.deliver(&message(), "alice");
        let (msg, sender) = stream.recv().await.unwrap();
        assert_eq!(msg, message());
        assert_eq!(sender, "alice");

        set.clear();
        assert!(stream.recv().await.is_none());
    }

    #[test]
    fn test_closed_stream_is_pruned() {
        let set = Arc::new(SubscriberSet::default());
        let stream = set.stream();
        drop(stream);
        assert_eq!(set.deliver(&message(), "alice"), 0);
        assert_eq!(set.len(), 0);
    }
}
