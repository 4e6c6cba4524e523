//! Sacred Mesh - encrypted, multi-transport messaging for short intent messages
//!
//! Sacred Mesh moves small symbolic "intent" messages between peers over any
//! number of pluggable transports. Every message is encoded with a compact
//! CBOR-like codec, sealed with XChaCha20-Poly1305, stamped with a TTL and a hop
//! limit, and fanned out across every active transport. Peers deduplicate,
//! relay, and deliver what they receive; senders queue while offline and flush
//! once a transport comes back.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sacred_mesh::{IntentMessage, MemoryHub, MeshKey, SacredMesh, StaticKeys};
//!
//! # async fn run() -> sacred_mesh::Result<()> {
//! let hub = MemoryHub::new();
//! let keys = Arc::new(StaticKeys::new(MeshKey::generate()));
//!
//! let mesh = SacredMesh::builder("alice")
//!     .keys(keys)
//!     .transport(Arc::new(hub.transport("local")))
//!     .build()?;
//!
//! mesh.initialize().await?;
//!
//! let message = IntentMessage::new(["harmony", "protection"], 0.8).with_note("stay safe");
//! mesh.send_message(&message).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Layers
//!
//! - [`protocol`] - value codec, intent messages and wire envelopes
//! - [`crypto`] - authenticated encryption and key resolution
//! - [`transport`] - transport capability trait and the fan-out manager
//! - [`mesh`] - dispatcher, outbound queue and the [`SacredMesh`] facade

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod mesh;
pub mod protocol;
pub mod transport;

pub use crypto::{KeyProvider, MeshKey, StaticKeys};
pub use mesh::{
    Clock, ConfigUpdate, ConnectionState, ManualClock, MeshConfig, MeshStatus, MessageStream,
    MetricsSnapshot, OverflowPolicy, QueueStats, SacredMesh, SacredMeshBuilder, Subscription,
    SystemClock,
};
pub use protocol::{
    Error, IntentMessage, MAX_PACKET_SIZE, Recipient, Result, Value, WireEnvelope,
};
pub use transport::{MemoryHub, MemoryTransport, Transport, TransportError, TransportManager};

/// Sacred Mesh wire protocol version
pub const VERSION: &str = "1.0.0";
