//! Named registry of transports with concurrent fan-out.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, instrument, warn};

use super::{Transport, TransportError, TransportEvent, TransportSink};

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOut {
    /// Transports that accepted the frame
    pub delivered: Vec<String>,
    /// Transports that were active but failed
    pub failed: Vec<(String, TransportError)>,
}

impl FanOut {
    /// Whether at least one transport accepted the frame
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        !self.delivered.is_empty()
    }
}

/// Owns the transports of one mesh.
///
/// Duplicate arrival across transports is expected and left to the receiver's
/// dedup cache; nothing is suppressed here.
#[derive(Default)]
pub struct TransportManager {
    transports: RwLock<Vec<Arc<dyn Transport>>>,
    events: Mutex<Option<UnboundedSender<TransportEvent>>>,
}

impl TransportManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transport. Attaches it immediately if the receive path is already set.
    pub fn register(&self, transport: Arc<dyn Transport>) -> Result<(), TransportError> {
        let name = transport.name().to_owned();
        {
            let mut transports = self.transports.write();
            if transports.iter().any(|t| t.name() == name) {
                return Err(TransportError::DuplicateName(name));
            }
            transports.push(Arc::clone(&transport));
        }

        if let Some(events) = self.events.lock().as_ref() {
            transport.attach(TransportSink::new(name.clone(), events.clone()));
        }
        debug!(transport = %name, "registered transport");
        Ok(())
    }

    /// Route every transport's events, current and future, into `events`.
    pub fn attach_all(&self, events: &UnboundedSender<TransportEvent>) {
        *self.events.lock() = Some(events.clone());
        for transport in self.snapshot() {
            transport.attach(TransportSink::new(transport.name(), events.clone()));
        }
    }

    /// Bring every transport up concurrently. Returns the failures.
    #[instrument(level = "debug", skip(self))]
    pub async fn connect_all(&self) -> Vec<TransportError> {
        let transports = self.snapshot();
        let results = join_all(transports.iter().map(|t| t.connect())).await;

        let mut failures = Vec::new();
        for (transport, result) in transports.iter().zip(results) {
            match result {
                Ok(()) => debug!(transport = transport.name(), "transport connected"),
                Err(err) => {
                    warn!(transport = transport.name(), error = %err, "transport failed to connect");
                    failures.push(err);
                }
            }
        }
        failures
    }

    /// Take every transport down concurrently. Failures are logged.
    #[instrument(level = "debug", skip(self))]
    pub async fn disconnect_all(&self) {
        let transports = self.snapshot();
        let results = join_all(transports.iter().map(|t| t.disconnect())).await;
        for (transport, result) in transports.iter().zip(results) {
            if let Err(err) = result {
                warn!(transport = transport.name(), error = %err, "transport failed to disconnect");
            }
        }
    }

    /// Send the same frame on every active transport except `exclude`.
    ///
    /// Per-transport failures are logged and collected; they never fail the call.
    #[instrument(level = "trace", skip(self, frame), fields(len = frame.len()))]
    pub async fn send(&self, frame: &[u8], exclude: Option<&str>) -> FanOut {
        let targets: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|t| t.is_active() && exclude != Some(t.name()))
            .collect();
        let results = join_all(targets.iter().map(|t| t.send(frame))).await;

        let mut outcome = FanOut::default();
        for (transport, result) in targets.iter().zip(results) {
            let name = transport.name().to_owned();
            match result {
                Ok(()) => outcome.delivered.push(name),
                Err(err) => {
                    warn!(transport = %name, error = %err, "send failed");
                    outcome.failed.push((name, err));
                }
            }
        }
        outcome
    }

    /// Active flag per transport name
    #[must_use]
    pub fn status(&self) -> BTreeMap<String, bool> {
        self.transports
            .read()
            .iter()
            .map(|t| (t.name().to_owned(), t.is_active()))
            .collect()
    }

    /// Whether any transport is active
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transports.read().iter().any(|t| t.is_active())
    }

    /// Same as [`TransportManager::is_connected`]
    #[must_use]
    pub fn has_active_transports(&self) -> bool {
        self.is_connected()
    }

    /// Number of registered transports
    #[must_use]
    pub fn len(&self) -> usize {
        self.transports.read().len()
    }

    /// Whether no transport is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transports.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Transport>> {
        self.transports.read().clone()
    }
}

impl std::fmt::Debug for TransportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportManager")
            .field("transports", &self.status())
            .finish_non_exhaustive()
    }
}
