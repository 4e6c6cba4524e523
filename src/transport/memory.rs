//! In-process transport for tests and demos.
//!
//! Every [`MemoryTransport`] created from the same [`MemoryHub`] behaves like a
//! radio sharing one channel: a frame sent by an active endpoint is received by
//! every other active endpoint on the hub.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use super::{Transport, TransportError, TransportSink};

/// Shared medium linking [`MemoryTransport`] endpoints.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    endpoints: Arc<Mutex<Vec<Arc<Endpoint>>>>,
}

impl MemoryHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an endpoint on this hub. It starts inactive.
    #[must_use]
    pub fn transport(&self, name: impl Into<String>) -> MemoryTransport {
        let endpoint = Arc::new(Endpoint::new(name.into()));
        self.endpoints.lock().push(Arc::clone(&endpoint));
        MemoryTransport {
            endpoint,
            hub: Some(self.clone()),
        }
    }

    /// Number of endpoints created on this hub
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.lock().len()
    }

    /// Whether the hub has no endpoints
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.lock().is_empty()
    }

    fn broadcast(&self, from: &Arc<Endpoint>, frame: &Bytes) {
        let peers: Vec<_> = self
            .endpoints
            .lock()
            .iter()
            .filter(|e| !Arc::ptr_eq(e, from) && e.active.load(Ordering::Acquire))
            .cloned()
            .collect();

        for peer in peers {
            let sink = peer.sink.lock().clone();
            if let Some(sink) = sink {
                if sink.frame(frame.clone()).is_err() {
                    trace!(transport = %peer.name, "peer mesh gone; frame discarded");
                }
            }
        }
    }
}

#[derive(Debug)]
struct Endpoint {
    name: String,
    active: AtomicBool,
    refuse_connect: AtomicBool,
    fail_sends: AtomicBool,
    sink: Mutex<Option<TransportSink>>,
    sent: Mutex<Vec<Bytes>>,
}

impl Endpoint {
    fn new(name: String) -> Self {
        Self {
            name,
            active: AtomicBool::new(false),
            refuse_connect: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            sink: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }
}

/// In-memory [`Transport`] endpoint.
///
/// Clones share state, so a test can keep one handle while the mesh owns
/// another.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    endpoint: Arc<Endpoint>,
    hub: Option<MemoryHub>,
}

impl MemoryTransport {
    /// Endpoint attached to no hub; frames are recorded but reach nobody.
    #[must_use]
    pub fn detached(name: impl Into<String>) -> Self {
        Self {
            endpoint: Arc::new(Endpoint::new(name.into())),
            hub: None,
        }
    }

    /// Flip the active flag as if the channel changed on its own.
    ///
    /// Announces `Up`/`Down` to the attached mesh when the flag actually changes.
    pub fn set_active(&self, active: bool) {
        let was = self.endpoint.active.swap(active, Ordering::AcqRel);
        if was == active {
            return;
        }
        let sink = self.endpoint.sink.lock().clone();
        if let Some(sink) = sink {
            let result = if active { sink.up() } else { sink.down() };
            if result.is_err() {
                trace!(transport = %self.endpoint.name, "mesh gone; transition not announced");
            }
        }
    }

    /// Make subsequent `connect` calls fail.
    pub fn set_refuse_connect(&self, refuse: bool) {
        self.endpoint.refuse_connect.store(refuse, Ordering::Release);
    }

    /// Make subsequent `send` calls fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.endpoint.fail_sends.store(fail, Ordering::Release);
    }

    /// Deliver a frame to this endpoint's mesh as if it arrived over the air.
    pub fn inject(&self, frame: impl Into<Bytes>) -> Result<(), TransportError> {
        let sink = self.endpoint.sink.lock().clone();
        match sink {
            Some(sink) => sink.frame(frame),
            None => Err(TransportError::ChannelClosed),
        }
    }

    /// Frames successfully sent through this endpoint, oldest first
    #[must_use]
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.endpoint.sent.lock().clone()
    }

    /// Forget recorded frames.
    pub fn clear_sent(&self) {
        self.endpoint.sent.lock().clear();
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if self.endpoint.refuse_connect.load(Ordering::Acquire) {
            return Err(TransportError::ConnectFailed {
                transport: self.endpoint.name.clone(),
                reason: "connection refused".into(),
            });
        }
        self.endpoint.active.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.endpoint.active.store(false, Ordering::Release);
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.is_active() {
            return Err(TransportError::NotConnected(self.endpoint.name.clone()));
        }
        if self.endpoint.fail_sends.load(Ordering::Acquire) {
            return Err(TransportError::SendFailed {
                transport: self.endpoint.name.clone(),
                reason: "simulated failure".into(),
            });
        }

        let frame = Bytes::copy_from_slice(frame);
        self.endpoint.sent.lock().push(frame.clone());
        if let Some(hub) = &self.hub {
            hub.broadcast(&self.endpoint, &frame);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.endpoint.active.load(Ordering::Acquire)
    }

    fn attach(&self, sink: TransportSink) {
        *self.endpoint.sink.lock() = Some(sink);
    }
}
