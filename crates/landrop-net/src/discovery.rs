//! Discovery listener and liveness sweep.
//!
//! Listens for peer announcements on the discovery port, turns new ones
//! into identity-verified TCP connections, and owns the
//! [`ConnectionRegistry`]. A second thread sweeps the registry on an
//! interval, probing every connection and removing the ones that no longer
//! answer.
//!
//! Announcement handling is idempotent per instance id: our own
//! announcements and announcements for already-connected instances are
//! ignored, and a failed connection attempt is dropped silently until the
//! peer announces again (UDP gives us the retry for free).

use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use landrop_core::{decode, Contact, InstanceId, PeerAnnouncement, WireMessage};
use landrop_core::protocol::messages::CONTROL_BUFFER_SIZE;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::client;
use crate::config::NetworkConfig;
use crate::context::NodeContext;
use crate::registry::{Connection, ConnectionRegistry};
use crate::util::{is_timeout, sleep_with_stop};

/// Poll cadence of the announcement receive loop.
const RECV_TIMEOUT: Duration = Duration::from_millis(500);
/// Bound on the TCP connect to a newly announced peer.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// Bound on the identity query against a newly connected peer; a timeout
/// counts as a failed query and the attempt is dropped.
const IDENTITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Error type for discovery startup.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP discovery socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for [`DiscoveryListener::send_file`].
#[derive(Debug, Error)]
pub enum SendFileError {
    /// The local source file does not exist. Reported before any network
    /// I/O, unlike transport failures which collapse to `false`.
    #[error("no such file: {}", .0.display())]
    SourceMissing(PathBuf),
}

/// Receives announcements, maintains peer connections, and serves the
/// reciprocation and send-file operations against them.
pub struct DiscoveryListener {
    config: NetworkConfig,
    context: Arc<dyn NodeContext>,
    registry: Arc<ConnectionRegistry>,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl DiscoveryListener {
    pub fn new(
        config: NetworkConfig,
        local_id: InstanceId,
        context: Arc<dyn NodeContext>,
    ) -> Self {
        Self {
            config,
            context,
            registry: Arc::new(ConnectionRegistry::new(local_id)),
            stop: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    /// Number of live peer connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Binds the discovery socket and spawns the listen and sweep threads.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::BindFailed`] if the discovery port cannot
    /// be bound.
    pub fn start(&mut self) -> Result<(), DiscoveryError> {
        let socket = self.make_listener_socket()?;
        self.stop.store(false, Ordering::Relaxed);

        let registry = Arc::clone(&self.registry);
        let stop = Arc::clone(&self.stop);
        let listen = std::thread::Builder::new()
            .name("landrop-discovery".to_string())
            .spawn(move || listen_loop(socket, registry, stop))
            .expect("failed to spawn discovery thread");
        self.handles.push(listen);

        let registry = Arc::clone(&self.registry);
        let stop = Arc::clone(&self.stop);
        let interval = self.config.sweep_interval();
        let sweep = std::thread::Builder::new()
            .name("landrop-sweep".to_string())
            .spawn(move || sweep_loop(registry, interval, stop))
            .expect("failed to spawn sweep thread");
        self.handles.push(sweep);

        info!(
            "discovery listener on UDP {} with a {:?} liveness sweep",
            self.config.discovery_port,
            self.config.sweep_interval()
        );
        Ok(())
    }

    /// Signals the listen and sweep threads to stop, joins them, and drops
    /// every peer connection.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        self.registry.clear();
    }

    /// Whether `contact` has added us back.
    ///
    /// Resolves the live connection by email and asks the peer whether our
    /// own email is in its contact book. Fails closed: no connection, any
    /// transport error, or an undecodable reply all yield `false`, and a
    /// transport error additionally drops the connection (the next
    /// announcement or sweep rebuilds or buries it).
    pub fn has_reciprocated(&self, contact: &Contact) -> bool {
        let Some(own_email) = self.context.current_email() else {
            error!("reciprocation check attempted with no logged-in user");
            return false;
        };

        let outcome = self.registry.with_connection(&contact.email, |conn| {
            (conn.instance_id, client::has_added(&mut conn.stream, &own_email))
        });
        match outcome {
            None => false,
            Some((_, Some(added))) => added,
            Some((id, None)) => {
                debug!("connection to {} died during reciprocation check", contact.email);
                self.registry.remove(&[id]);
                false
            }
        }
    }

    /// Sends `path` to `contact`, asking the remote operator for consent
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`SendFileError::SourceMissing`] if the local file does not
    /// exist, checked before any network I/O. Everything else (no
    /// connection, consent denied, transport failure mid-stream) collapses
    /// to `Ok(false)`.
    pub fn send_file(&self, contact: &Contact, path: &Path) -> Result<bool, SendFileError> {
        if !path.is_file() {
            return Err(SendFileError::SourceMissing(path.to_path_buf()));
        }
        let Some(own_email) = self.context.current_email() else {
            error!("send attempted with no logged-in user");
            return Ok(false);
        };

        let sent = self.registry.with_connection(&contact.email, |conn| {
            if !client::request_send_consent(&mut conn.stream, &own_email) {
                debug!("{} declined the transfer (or went away)", contact.email);
                return false;
            }
            client::stream_file(&mut conn.stream, path)
        });
        Ok(sent.unwrap_or(false))
    }

    /// Binds the discovery port with address and port reuse enabled so
    /// several instances on one host can all hear the same broadcasts.
    fn make_listener_socket(&self) -> Result<UdpSocket, DiscoveryError> {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.discovery_port);
        let parsed: SocketAddr = addr.parse().map_err(|_| DiscoveryError::BindFailed {
            addr: addr.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad bind address"),
        })?;

        let bind = || -> std::io::Result<UdpSocket> {
            let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
            socket.set_reuse_address(true)?;
            #[cfg(unix)]
            socket.set_reuse_port(true)?;
            socket.set_read_timeout(Some(RECV_TIMEOUT))?;
            socket.bind(&parsed.into())?;
            Ok(socket.into())
        };
        bind().map_err(|source| DiscoveryError::BindFailed { addr, source })
    }
}

// ── Listen loop ───────────────────────────────────────────────────────────────

fn listen_loop(socket: UdpSocket, registry: Arc<ConnectionRegistry>, stop: Arc<AtomicBool>) {
    let mut buf = [0u8; CONTROL_BUFFER_SIZE];

    while !stop.load(Ordering::Relaxed) {
        let (n, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                warn!("discovery recv error: {e}");
                continue;
            }
        };

        match decode(&buf[..n]) {
            Ok(WireMessage::Announcement(ann)) => process_announcement(&registry, ann),
            Ok(other) => {
                warn!(
                    "unexpected message on discovery port from {src}: {:?}",
                    std::mem::discriminant(&other)
                );
            }
            Err(e) => debug!("failed to decode discovery datagram from {src}: {e}"),
        }
    }
    info!("discovery listener stopped");
}

/// Turns one announcement into a registered connection, or ignores it.
fn process_announcement(registry: &ConnectionRegistry, ann: PeerAnnouncement) {
    if ann.instance_id == registry.local_id() {
        // Our own broadcast came back around.
        return;
    }
    if registry.contains(ann.instance_id) {
        return;
    }

    let addr_text = format!("{}:{}", ann.announced_ip, ann.announced_port);
    let Ok(addr) = addr_text.parse::<SocketAddr>() else {
        debug!("announcement from {} carries unusable address {addr_text}", ann.instance_id);
        return;
    };

    debug!("connecting to announced peer {} at {addr}", ann.instance_id);
    let mut stream = match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
        Ok(stream) => stream,
        Err(e) => {
            // No retry: the peer keeps announcing, so we'll get another shot.
            debug!("connect to {addr} failed: {e}");
            return;
        }
    };

    stream.set_read_timeout(Some(IDENTITY_TIMEOUT)).ok();
    let Some(email) = client::fetch_identity(&mut stream) else {
        debug!("identity query against {addr} failed, dropping the attempt");
        return;
    };
    stream.set_read_timeout(None).ok();

    if registry.add(Connection::new(ann.instance_id, email.clone(), stream)) {
        info!("connected to {email} ({addr})");
    }
}

// ── Sweep loop ────────────────────────────────────────────────────────────────

fn sweep_loop(registry: Arc<ConnectionRegistry>, interval: Duration, stop: Arc<AtomicBool>) {
    loop {
        if !sleep_with_stop(&stop, interval) {
            break;
        }
        let dead = registry.probe_all();
        if !dead.is_empty() {
            info!("liveness sweep removing {} unresponsive peer(s)", dead.len());
            registry.remove(&dead);
        }
    }
    info!("liveness sweep stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedContext;
    use landrop_core::ContactBook;
    use uuid::Uuid;

    fn listener_on(port: u16) -> DiscoveryListener {
        let config = NetworkConfig {
            bind_addr: "127.0.0.1".to_string(),
            discovery_port: port,
            sweep_interval_ms: 200,
            ..NetworkConfig::default()
        };
        DiscoveryListener::new(
            config,
            Uuid::new_v4(),
            Arc::new(FixedContext::new("alice@example.com", ContactBook::new())),
        )
    }

    #[test]
    fn test_own_announcement_never_creates_a_registry_entry() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        // Whatever address it advertises, a self-announcement is ignored.
        for (ip, port) in [("127.0.0.1", 1100u16), ("10.0.0.9", 65535)] {
            process_announcement(
                &registry,
                PeerAnnouncement {
                    instance_id: registry.local_id(),
                    announced_ip: ip.to_string(),
                    announced_port: port,
                },
            );
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unusable_announced_address_is_dropped_silently() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        process_announcement(
            &registry,
            PeerAnnouncement {
                instance_id: Uuid::new_v4(),
                announced_ip: "definitely not an ip".to_string(),
                announced_port: 1100,
            },
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unreachable_peer_is_dropped_silently() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        // An ephemeral port we just released: nothing listens there.
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        process_announcement(
            &registry,
            PeerAnnouncement {
                instance_id: Uuid::new_v4(),
                announced_ip: "127.0.0.1".to_string(),
                announced_port: port,
            },
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_has_reciprocated_is_false_without_a_connection() {
        let listener = listener_on(24310);
        let contact = Contact::new("Bob", "bob@example.com");
        assert!(!listener.has_reciprocated(&contact));
    }

    #[test]
    fn test_send_file_reports_a_missing_source_before_any_network_io() {
        let listener = listener_on(24311);
        let contact = Contact::new("Bob", "bob@example.com");
        let missing = Path::new("/definitely/not/a/real/file.bin");

        let result = listener.send_file(&contact, missing);
        assert!(matches!(result, Err(SendFileError::SourceMissing(_))));
    }

    #[test]
    fn test_send_file_is_false_when_no_connection_exists() {
        let listener = listener_on(24312);
        let contact = Contact::new("Bob", "bob@example.com");

        let dir = std::env::temp_dir().join(format!("landrop_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("hello.txt");
        std::fs::write(&file, b"hello").unwrap();

        assert_eq!(listener.send_file(&contact, &file).unwrap(), false);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_start_and_stop_join_cleanly() {
        let mut listener = listener_on(24313);
        listener.start().expect("start");
        listener.stop();
        assert!(listener.handles.is_empty(), "threads must be joined");
    }
}
