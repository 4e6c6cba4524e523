//! Pluggable transports and multi-transport fan-out
//!
//! The mesh depends only on the [`Transport`] capability trait. Concrete radio,
//! peer-to-peer and relay channels live outside this crate; [`MemoryTransport`]
//! links meshes inside one process.

mod error;
mod manager;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;

pub use error::TransportError;
pub use manager::{FanOut, TransportManager};
pub use memory::{MemoryHub, MemoryTransport};

/// Capability interface implemented by every channel the mesh can use.
///
/// Inbound frames and self-initiated up/down transitions are pushed through the
/// [`TransportSink`] handed to [`Transport::attach`]. Results of `connect` and
/// `disconnect` are reported by their return values instead.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Unique name within one mesh (e.g. `"lora"`, `"webrtc"`)
    fn name(&self) -> &str;

    /// Bring the channel up.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Take the channel down.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Transmit one frame to whoever is reachable.
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Whether frames can currently be sent.
    fn is_active(&self) -> bool;

    /// Install the receive path. Replaces any previously attached sink.
    fn attach(&self, sink: TransportSink);
}

/// Event raised by a transport towards the mesh dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw frame received
    Frame {
        /// Name of the transport the frame arrived on
        transport: String,
        /// Frame contents
        bytes: Bytes,
    },
    /// Transport became active on its own
    Up(String),
    /// Transport went inactive on its own
    Down(String),
}

impl TransportEvent {
    /// Name of the transport that raised the event
    #[must_use]
    pub fn transport(&self) -> &str {
        match self {
            Self::Frame { transport, .. } => transport,
            Self::Up(name) | Self::Down(name) => name,
        }
    }
}

/// Receive path handed to a transport, tagged with that transport's name
#[derive(Debug, Clone)]
pub struct TransportSink {
    transport: String,
    events: UnboundedSender<TransportEvent>,
}

impl TransportSink {
    /// Create a sink that tags events with `transport`.
    #[must_use]
    pub fn new(transport: impl Into<String>, events: UnboundedSender<TransportEvent>) -> Self {
        Self {
            transport: transport.into(),
            events,
        }
    }

    /// Name events are tagged with
    #[must_use]
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// Hand a received frame to the mesh.
    pub fn frame(&self, bytes: impl Into<Bytes>) -> Result<(), TransportError> {
        self.push(TransportEvent::Frame {
            transport: self.transport.clone(),
            bytes: bytes.into(),
        })
    }

    /// Announce that the transport came up.
    pub fn up(&self) -> Result<(), TransportError> {
        self.push(TransportEvent::Up(self.transport.clone()))
    }

    /// Announce that the transport went down.
    pub fn down(&self) -> Result<(), TransportError> {
        self.push(TransportEvent::Down(self.transport.clone()))
    }

    /// Whether the receiving mesh has gone away
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    fn push(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.events
            .send(event)
            .map_err(|_| TransportError::ChannelClosed)
    }
}
