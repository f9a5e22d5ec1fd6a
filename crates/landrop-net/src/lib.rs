//! # landrop-net
//!
//! The LanDrop networking subsystem: peer discovery over UDP broadcast, a
//! registry of live peer connections, a JSON TCP control protocol, and the
//! consent-gated file-transfer handshake.
//!
//! # Architecture
//!
//! ```text
//! NetworkOrchestrator::start()
//!  └─ ControlServer        -- binds first free port in the control range,
//!  │                          accept loop + one thread per peer connection
//!  └─ Broadcaster          -- announces {instance id, ip, control port}
//!  │                          over UDP broadcast every second
//!  └─ DiscoveryListener    -- receives announcements, opens connections,
//!                             owns the ConnectionRegistry, sweeps liveness
//! ```
//!
//! Every long-running loop is a dedicated named OS thread that polls a
//! shared stop flag; `stop()` is synchronous and joins everything it owns.
//! The application layer is reached only through the [`NodeContext`] trait,
//! so this crate never touches persistence or the operator terminal.

pub mod broadcast;
pub mod client;
pub mod config;
pub mod context;
pub mod discovery;
pub mod orchestrator;
pub mod registry;
pub mod server;
mod util;

pub use broadcast::{BroadcastError, Broadcaster};
pub use config::NetworkConfig;
pub use context::{FixedContext, NodeContext};
pub use discovery::{DiscoveryError, DiscoveryListener, SendFileError};
pub use orchestrator::{NetworkOrchestrator, OrchestratorError};
pub use registry::{Connection, ConnectionRegistry};
pub use server::{ConsentGate, ControlServer, ServerError};
