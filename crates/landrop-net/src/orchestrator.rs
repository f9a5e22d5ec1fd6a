//! Lifecycle sequencing for the networking subsystem, and the facade the
//! application layer talks to.
//!
//! Startup order matters: the control server must bind a port before the
//! broadcaster may advertise anything, and the discovery listener only
//! starts once we are advertisable ourselves. Shutdown runs the same
//! sequence in reverse and joins every owned thread before returning.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use landrop_core::{Contact, InstanceId, PeerAnnouncement};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::broadcast::{BroadcastError, Broadcaster};
use crate::config::NetworkConfig;
use crate::context::NodeContext;
use crate::discovery::{DiscoveryError, DiscoveryListener, SendFileError};
use crate::server::{ControlServer, ServerError};
use crate::util::local_ip;

/// Poll interval of the spin-wait for the control server's bound port.
const PORT_POLL: Duration = Duration::from_millis(10);

/// Error type for orchestrator startup.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Owns the control server, broadcaster, and discovery listener, and
/// sequences their lifecycle.
pub struct NetworkOrchestrator {
    local_id: InstanceId,
    config: NetworkConfig,
    server: ControlServer,
    broadcaster: Broadcaster,
    listener: DiscoveryListener,
    running: bool,
}

impl NetworkOrchestrator {
    /// Builds the subsystem around an application context. Generates a
    /// fresh instance id for this process.
    pub fn new(config: NetworkConfig, context: Arc<dyn NodeContext>) -> Self {
        let local_id = Uuid::new_v4();
        Self {
            local_id,
            server: ControlServer::new(config.clone(), Arc::clone(&context)),
            broadcaster: Broadcaster::new(&config),
            listener: DiscoveryListener::new(config.clone(), local_id, context),
            config,
            running: false,
        }
    }

    /// Starts everything, in dependency order.
    ///
    /// # Errors
    ///
    /// Any component failing to start aborts the sequence; components
    /// already started are stopped again, so an `Err` leaves no thread
    /// running.
    pub fn start(&mut self) -> Result<(), OrchestratorError> {
        self.server.start()?;

        // The port slot is filled by the time start() returns, but the
        // contract is simply "wait until bound", so spin on the slot.
        let port = loop {
            match self.server.port() {
                Some(port) => break port,
                None => std::thread::sleep(PORT_POLL),
            }
        };

        let announced_ip = match &self.config.announce_ip {
            Some(ip) => ip.clone(),
            None => local_ip().to_string(),
        };
        self.broadcaster.set_announcement(PeerAnnouncement {
            instance_id: self.local_id,
            announced_ip,
            announced_port: port,
        });

        if let Err(e) = self.broadcaster.start() {
            self.server.stop();
            return Err(e.into());
        }
        if let Err(e) = self.listener.start() {
            self.broadcaster.stop();
            self.server.stop();
            return Err(e.into());
        }

        self.running = true;
        info!("network subsystem up: instance {} on control port {port}", self.local_id);
        Ok(())
    }

    /// Stops everything in reverse start order, joining every thread.
    /// Idempotent.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.listener.stop();
        self.broadcaster.stop();
        self.server.stop();
        self.running = false;
        info!("network subsystem stopped");
    }

    // ── Facade consumed by the application layer ──────────────────────────────

    /// Whether `contact` has added us back; see
    /// [`DiscoveryListener::has_reciprocated`].
    pub fn has_reciprocated(&self, contact: &Contact) -> bool {
        self.listener.has_reciprocated(contact)
    }

    /// Sends a file to `contact` after obtaining remote consent; see
    /// [`DiscoveryListener::send_file`].
    pub fn send_file(&self, contact: &Contact, path: &Path) -> Result<bool, SendFileError> {
        self.listener.send_file(contact, path)
    }

    /// Whether an inbound transfer is waiting on the operator's decision.
    pub fn is_awaiting_consent(&self) -> bool {
        self.server.is_awaiting_consent()
    }

    /// Relays the operator's consent decision to the waiting handler.
    pub fn resolve_consent(&self, allow: bool) {
        self.server.resolve_consent(allow);
    }

    pub fn local_instance_id(&self) -> InstanceId {
        self.local_id
    }

    /// The bound control port, once started.
    pub fn control_port(&self) -> Option<u16> {
        self.server.port()
    }

    /// Number of live peer connections.
    pub fn connection_count(&self) -> usize {
        self.listener.connection_count()
    }
}

impl Drop for NetworkOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
