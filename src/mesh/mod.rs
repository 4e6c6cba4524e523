//! Sacred Mesh runtime
//!
//! [`SacredMesh`] is the explicitly owned facade: it seals outgoing intents,
//! fans them out across every active transport or queues them while offline,
//! and runs one dispatcher task that routes everything received.
//!
//! ```text
//! send_to ──► build_envelope ──► serialize ──► TransportManager::send
//!                                         └──► OutboundQueue (offline)
//!
//! transport ─► TransportEvent ─► dispatcher task ─► Dispatcher::process
//!                                                  ├─► relay (hops - 1)
//!                                                  └─► subscribers
//! ```

mod clock;
mod config;
mod dedup;
mod dispatcher;
mod metrics;
mod queue;
mod status;
mod subscription;

use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigUpdate, MeshConfig, OverflowPolicy};
pub use dedup::DedupCache;
pub use dispatcher::{Delivery, Dispatcher, Disposition, DropReason};
pub use metrics::MetricsSnapshot;
pub use queue::{OutboundQueue, QueueEntry, QueueStats};
pub use status::{ConnectionState, MeshStatus};
pub use subscription::{MessageStream, Subscription};

use self::metrics::MeshMetrics;
use self::subscription::SubscriberSet;
use crate::crypto::KeyProvider;
use crate::protocol::{Error, IntentMessage, MessageId, Recipient, Result, build_envelope};
use crate::transport::{Transport, TransportEvent, TransportManager};

/// One node of the mesh.
///
/// Cheap to clone; clones share the same node. Sends issued before
/// [`SacredMesh::initialize`] are queued and flushed once a transport is up.
#[derive(Clone)]
pub struct SacredMesh {
    inner: Arc<MeshInner>,
}

struct MeshInner {
    sender_id: String,
    config: RwLock<MeshConfig>,
    keys: Arc<dyn KeyProvider>,
    clock: Arc<dyn Clock>,
    transports: TransportManager,
    queue: Mutex<OutboundQueue>,
    lifecycle: Mutex<Lifecycle>,
    subscribers: Arc<SubscriberSet>,
    metrics: MeshMetrics,
    events: UnboundedSender<TransportEvent>,
    startup: Mutex<Option<(UnboundedReceiver<TransportEvent>, Dispatcher)>>,
    task: Mutex<Option<JoinHandle<()>>>,
    init_lock: tokio::sync::Mutex<()>,
    flush_lock: tokio::sync::Mutex<()>,
}

#[derive(Debug, Default)]
struct Lifecycle {
    state: ConnectionState,
    error: Option<String>,
}

impl SacredMesh {
    /// Create a mesh node with no transports yet.
    #[must_use]
    pub fn new(
        config: MeshConfig,
        sender_id: impl Into<String>,
        keys: Arc<dyn KeyProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sender_id = sender_id.into();
        let (events, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            sender_id.clone(),
            config.circles.clone(),
            Arc::clone(&keys),
            config.dedup_capacity,
        );
        let queue = OutboundQueue::new(config.max_queue_size, config.overflow_policy);

        Self {
            inner: Arc::new(MeshInner {
                sender_id,
                config: RwLock::new(config),
                keys,
                clock,
                transports: TransportManager::new(),
                queue: Mutex::new(queue),
                lifecycle: Mutex::new(Lifecycle::default()),
                subscribers: Arc::new(SubscriberSet::default()),
                metrics: MeshMetrics::default(),
                events,
                startup: Mutex::new(Some((rx, dispatcher))),
                task: Mutex::new(None),
                init_lock: tokio::sync::Mutex::new(()),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Start building a mesh node identified by `sender_id`.
    #[must_use]
    pub fn builder(sender_id: impl Into<String>) -> SacredMeshBuilder {
        SacredMeshBuilder::new(sender_id)
    }

    /// This node's sender id
    #[must_use]
    pub fn sender_id(&self) -> &str {
        &self.inner.sender_id
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> MeshConfig {
        self.inner.config.read().clone()
    }

    /// Change hop, TTL, relay or overflow settings on a live mesh.
    ///
    /// Applies to messages sent and relayed afterwards.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a zero TTL or a hop bound above the wire limit;
    /// nothing is changed in that case.
    pub fn update_config(&self, update: &ConfigUpdate) -> Result<()> {
        let inner = &self.inner;
        let mut config = inner.config.write();
        config.apply(update)?;
        if let Some(policy) = update.overflow_policy {
            inner.queue.lock().set_policy(policy);
        }
        info!(?update, "mesh config updated");
        Ok(())
    }

    /// Register another transport.
    ///
    /// After initialization the transport is connected right away and the
    /// queue is flushed if it came up.
    pub async fn add_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        let state = self.inner.state();
        if state == ConnectionState::Closed {
            return Err(Error::Closed);
        }
        self.inner.transports.register(Arc::clone(&transport))?;

        if state.is_running() {
            match transport.connect().await {
                Ok(()) => self.inner.on_transport_up(transport.name()).await,
                Err(err) => warn!(transport = transport.name(), error = %err, "late transport failed to connect"),
            }
        }
        Ok(())
    }

    /// Bring every transport up concurrently and start the dispatcher.
    ///
    /// Idempotent. Failing to bring up any transport is not an error here; it
    /// is reported through [`MeshStatus::error`] and sends keep queueing.
    #[instrument(level = "info", skip(self), fields(sender = %self.inner.sender_id))]
    pub async fn initialize(&self) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.init_lock.lock().await;
        match inner.state() {
            ConnectionState::Uninitialized => {}
            ConnectionState::Closed => return Err(Error::Closed),
            _ => return Ok(()),
        }
        inner.set_state(ConnectionState::Initializing);

        inner.transports.attach_all(&inner.events);
        let startup = inner.startup.lock().take();
        if let Some((rx, dispatcher)) = startup {
            let task = tokio::spawn(run_dispatcher(Arc::downgrade(inner), rx, dispatcher));
            *inner.task.lock() = Some(task);
        }

        let failures = inner.transports.connect_all().await;
        if inner.transports.has_active_transports() {
            inner.set_state(ConnectionState::Connected);
            info!(transports = ?inner.transports.status(), "mesh connected");
            inner.flush_queue().await;
        } else {
            let reason = if failures.is_empty() {
                "no transport could be brought up".to_owned()
            } else {
                let causes: Vec<_> = failures.iter().map(ToString::to_string).collect();
                format!("no transport could be brought up: {}", causes.join("; "))
            };
            warn!(error = %reason, "mesh initialized without an active transport");
            let mut lifecycle = inner.lifecycle.lock();
            if lifecycle.state != ConnectionState::Closed {
                lifecycle.state = ConnectionState::Disconnected;
                lifecycle.error = Some(reason);
            }
        }
        Ok(())
    }

    /// Build an intent with this mesh's default TTL and hop limit.
    pub fn compose<I, S>(&self, sigils: I, intent_strength: f32) -> IntentMessage
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = self.inner.config.read();
        IntentMessage::new(sigils, intent_strength)
            .with_ttl(config.default_ttl)
            .with_hop_limit(config.max_hops)
    }

    /// Broadcast `message` to the whole mesh.
    pub async fn send_message(&self, message: &IntentMessage) -> Result<MessageId> {
        self.send_to(message, Recipient::Broadcast).await
    }

    /// Seal `message` for `recipient` and hand it to the active transports,
    /// or to the outbound queue when none is active. A frame never overtakes
    /// one that is already queued.
    ///
    /// Returns once the frame is handed off; there is no delivery confirmation.
    ///
    /// # Errors
    ///
    /// Validation failures, [`Error::PayloadTooLarge`], [`Error::MissingKey`],
    /// [`Error::QueueOverflow`] under [`OverflowPolicy::RejectNew`], and
    /// [`Error::Closed`] after shutdown.
    #[instrument(level = "debug", skip(self, message, recipient), fields(recipient = %recipient))]
    pub async fn send_to(&self, message: &IntentMessage, recipient: Recipient) -> Result<MessageId> {
        let inner = &self.inner;
        let state = inner.state();
        if state == ConnectionState::Closed {
            return Err(Error::Closed);
        }

        message.validate()?;
        let mut message = message.clone();
        message.hop_limit = message.hop_limit.min(inner.config.read().max_hops);

        let key = inner
            .keys
            .outbound_key(&recipient)
            .ok_or_else(|| Error::MissingKey(recipient.to_string()))?;
        let now = inner.clock.now();
        let envelope = build_envelope(&message, &recipient, &inner.sender_id, &key, now)?;
        let frame = Bytes::from(envelope.serialize()?);
        let message_id = *envelope.message_id();

        let online = state.is_running() && inner.transports.has_active_transports();
        let backlog = !inner.queue.lock().is_empty();

        // Queued frames go first; a new frame only skips the queue when it is empty.
        if online && !backlog {
            let outcome = inner.transports.send(&frame, None).await;
            inner.metrics.record_transport_errors(outcome.failed.len());
            if outcome.is_delivered() {
                inner.metrics.record_sent();
                trace!(transports = ?outcome.delivered, "message sent");
                if !inner.queue.lock().is_empty() {
                    inner.flush_queue().await;
                }
                return Ok(message_id);
            }
        }

        let entry = QueueEntry::new(frame, message_id, envelope.ttl_deadline(), now);
        inner.enqueue(entry, now)?;
        if online && backlog {
            inner.flush_queue().await;
        }
        Ok(message_id)
    }

    /// Call `callback` with every delivered message and its sender id.
    ///
    /// Subscribers run on the dispatcher task and should return quickly.
    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&IntentMessage, &str) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    /// Receive delivered messages as `(message, sender_id)` pairs.
    #[must_use]
    pub fn messages(&self) -> MessageStream {
        self.inner.subscribers.stream()
    }

    /// Send queued messages in FIFO order. Returns how many went out.
    ///
    /// Only one flush runs at a time; a concurrent call returns 0. Stops early,
    /// keeping what remains, once no transport is active.
    pub async fn flush_queue(&self) -> usize {
        self.inner.flush_queue().await
    }

    /// Current connection status
    #[must_use]
    pub fn status(&self) -> MeshStatus {
        let inner = &self.inner;
        let (state, error) = {
            let lifecycle = inner.lifecycle.lock();
            (lifecycle.state, lifecycle.error.clone())
        };
        let is_connected = inner.transports.is_connected();
        MeshStatus {
            transports: inner.transports.status(),
            is_connected,
            has_active_transports: is_connected,
            queued_messages: inner.queue.lock().len(),
            error,
            state,
        }
    }

    /// Depth and age of the outbound queue
    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.inner.queue.lock().stats(self.inner.clock.now())
    }

    /// Counters since creation
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Stop the dispatcher, take transports down and end all subscriptions.
    ///
    /// Terminal; later sends fail with [`Error::Closed`].
    #[instrument(level = "info", skip(self), fields(sender = %self.inner.sender_id))]
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        {
            let mut lifecycle = inner.lifecycle.lock();
            if lifecycle.state == ConnectionState::Closed {
                return;
            }
            lifecycle.state = ConnectionState::Closed;
        }

        let task = inner.task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        inner.transports.disconnect_all().await;

        let discarded = {
            let mut queue = inner.queue.lock();
            let len = queue.len();
            queue.clear();
            len
        };
        inner.subscribers.clear();
        info!(discarded, "mesh closed");
    }
}

impl std::fmt::Debug for SacredMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SacredMesh")
            .field("sender_id", &self.inner.sender_id)
            .field("state", &self.inner.state())
            .field("transports", &self.inner.transports)
            .finish_non_exhaustive()
    }
}

impl MeshInner {
    fn state(&self) -> ConnectionState {
        self.lifecycle.lock().state
    }

    fn set_state(&self, state: ConnectionState) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != ConnectionState::Closed {
            lifecycle.state = state;
        }
    }

    fn enqueue(&self, entry: QueueEntry, now: u64) -> Result<()> {
        let (dropped, queued) = {
            let mut queue = self.queue.lock();
            let dropped = queue.push(entry)?;
            (dropped, queue.len())
        };
        self.metrics.record_queued();
        if let Some(dropped) = dropped {
            self.metrics.record_queue_discarded(1);
            debug!(age = now.saturating_sub(dropped.enqueued_at), "queue full; dropped oldest entry");
        }
        debug!(queued, "message queued");
        Ok(())
    }

    async fn handle_event(&self, dispatcher: &mut Dispatcher, event: TransportEvent) {
        match event {
            TransportEvent::Frame { transport, bytes } => {
                self.handle_frame(dispatcher, &transport, &bytes).await;
            }
            TransportEvent::Up(name) => self.on_transport_up(&name).await,
            TransportEvent::Down(name) => {
                if !self.state().is_running() {
                    return;
                }
                if self.transports.has_active_transports() {
                    debug!(transport = %name, "transport down; others remain active");
                } else {
                    info!(transport = %name, "last transport down; queueing sends");
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }
    }

    async fn handle_frame(&self, dispatcher: &mut Dispatcher, origin: &str, bytes: &[u8]) {
        match dispatcher.process(bytes, origin, self.clock.now()) {
            Disposition::Dropped(reason) => self.metrics.record_drop(reason),
            Disposition::Accepted { delivery, relay } => {
                if let Some(frame) = relay {
                    let exclude_origin = self.config.read().exclude_origin_on_relay;
                    let exclude = exclude_origin.then_some(origin);
                    let outcome = self.transports.send(&frame, exclude).await;
                    self.metrics.record_transport_errors(outcome.failed.len());
                    if outcome.is_delivered() {
                        self.metrics.record_relayed();
                    }
                }
                if let Some(delivery) = delivery {
                    let reached = self
                        .subscribers
                        .deliver(&delivery.message, &delivery.sender_id);
                    self.metrics.record_delivered();
                    trace!(reached, sender = %delivery.sender_id, "message delivered");
                }
            }
        }
    }

    async fn on_transport_up(&self, name: &str) {
        if !self.state().is_running() {
            return;
        }
        info!(transport = %name, "transport up");
        self.set_state(ConnectionState::Connected);
        self.flush_queue().await;
    }

    async fn flush_queue(&self) -> usize {
        let Ok(_guard) = self.flush_lock.try_lock() else {
            trace!("flush already in progress");
            return 0;
        };

        let mut flushed = 0;
        while self.transports.has_active_transports() {
            let now = self.clock.now();
            let next = {
                let mut queue = self.queue.lock();
                let expired = queue.discard_expired(now);
                if expired > 0 {
                    self.metrics.record_queue_discarded(expired);
                    debug!(expired, "discarded expired queue entries");
                }
                queue.pop_front()
            };
            let Some(mut entry) = next else {
                break;
            };

            entry.attempts += 1;
            let outcome = self.transports.send(&entry.bytes, None).await;
            self.metrics.record_transport_errors(outcome.failed.len());
            if outcome.is_delivered() {
                flushed += 1;
                self.metrics.record_flushed();
            } else {
                if self.queue.lock().requeue_front(entry).is_some() {
                    self.metrics.record_queue_discarded(1);
                }
                break;
            }
        }

        if flushed > 0 {
            debug!(flushed, remaining = self.queue.lock().len(), "flushed outbound queue");
        }
        flushed
    }
}

impl Drop for MeshInner {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn run_dispatcher(
    mesh: Weak<MeshInner>,
    mut events: UnboundedReceiver<TransportEvent>,
    mut dispatcher: Dispatcher,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = mesh.upgrade() else {
            break;
        };
        inner.handle_event(&mut dispatcher, event).await;
    }
    trace!("dispatcher stopped");
}

/// Builder for [`SacredMesh`].
pub struct SacredMeshBuilder {
    sender_id: String,
    config: MeshConfig,
    keys: Option<Arc<dyn KeyProvider>>,
    clock: Arc<dyn Clock>,
    transports: Vec<Arc<dyn Transport>>,
}

impl SacredMeshBuilder {
    /// Start with default configuration and the system clock.
    #[must_use]
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            config: MeshConfig::default(),
            keys: None,
            clock: Arc::new(SystemClock),
            transports: Vec::new(),
        }
    }

    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: MeshConfig) -> Self {
        self.config = config;
        self
    }

    /// Key material for sealing and opening messages. Required.
    #[must_use]
    pub fn keys(mut self, keys: Arc<dyn KeyProvider>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Time source for TTL decisions.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Add a transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Create the mesh.
    ///
    /// # Errors
    ///
    /// [`Error::MissingKey`] when no key provider was set, and
    /// [`Error::Transport`] when two transports share a name.
    pub fn build(self) -> Result<SacredMesh> {
        let keys = self
            .keys
            .ok_or_else(|| Error::MissingKey("key provider not configured".into()))?;
        let mesh = SacredMesh::new(self.config, self.sender_id, keys, self.clock);
        for transport in self.transports {
            mesh.inner.transports.register(transport)?;
        }
        Ok(mesh)
    }
}

impl std::fmt::Debug for SacredMeshBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SacredMeshBuilder")
            .field("sender_id", &self.sender_id)
            .field("config", &self.config)
            .field("transports", &self.transports.len())
            .finish_non_exhaustive()
    }
}
