//! Announcement broadcaster.
//!
//! One dedicated thread sends the current [`PeerAnnouncement`] to the
//! configured broadcast address every interval. Until an announcement is
//! set, nothing is sent at all: the control port is unknown before the
//! control server has bound one, and advertising a placeholder would invite
//! connections to a port nobody listens on.

use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};
use std::thread::JoinHandle;
use std::time::Duration;

use landrop_core::{encode, PeerAnnouncement, WireMessage};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::config::NetworkConfig;
use crate::util::sleep_with_stop;

/// Error type for broadcaster startup.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The configured broadcast destination is not a valid socket address.
    #[error("invalid broadcast destination {dest}: {source}")]
    InvalidDestination {
        dest: String,
        #[source]
        source: std::net::AddrParseError,
    },
    /// The UDP socket could not be created or configured.
    #[error("failed to set up broadcast socket: {0}")]
    Socket(#[from] std::io::Error),
}

/// Periodically announces this instance's reachability over UDP broadcast.
pub struct Broadcaster {
    dest: String,
    interval: Duration,
    announcement: Arc<Mutex<Option<PeerAnnouncement>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Broadcaster {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            dest: format!("{}:{}", config.broadcast_addr, config.announce_port),
            interval: config.broadcast_interval(),
            announcement: Arc::new(Mutex::new(None)),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Replaces the announcement read by the next send.
    pub fn set_announcement(&self, msg: PeerAnnouncement) {
        let mut slot = self
            .announcement
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(msg);
    }

    /// Spawns the broadcast thread.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError`] if the destination address is invalid or
    /// the socket cannot be created.
    pub fn start(&mut self) -> Result<(), BroadcastError> {
        let dest: SocketAddr =
            self.dest
                .parse()
                .map_err(|source| BroadcastError::InvalidDestination {
                    dest: self.dest.clone(),
                    source,
                })?;
        let socket = make_broadcast_socket()?;

        self.stop.store(false, Ordering::Relaxed);
        let announcement = Arc::clone(&self.announcement);
        let stop = Arc::clone(&self.stop);
        let interval = self.interval;

        let handle = std::thread::Builder::new()
            .name("landrop-broadcast".to_string())
            .spawn(move || broadcast_loop(socket, dest, interval, announcement, stop))?;
        self.handle = Some(handle);

        info!("broadcaster started, announcing to {dest} every {interval:?}");
        Ok(())
    }

    /// Signals the broadcast thread to stop and joins it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn broadcast_loop(
    socket: UdpSocket,
    dest: SocketAddr,
    interval: Duration,
    announcement: Arc<Mutex<Option<PeerAnnouncement>>>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        let current = announcement
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match current {
            Some(msg) => match encode(&WireMessage::Announcement(msg)) {
                Ok(bytes) => {
                    if let Err(e) = socket.send_to(&bytes, dest) {
                        warn!("announcement send to {dest} failed: {e}");
                    } else {
                        trace!("announcement sent to {dest}");
                    }
                }
                Err(e) => debug!("failed to encode announcement: {e}"),
            },
            // No announcement configured yet: stay silent.
            None => trace!("no announcement set, skipping send"),
        }

        if !sleep_with_stop(&stop, interval) {
            break;
        }
    }
    info!("broadcaster stopped");
}

/// Creates a UDP socket permitted to send to broadcast addresses.
fn make_broadcast_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.bind(&"0.0.0.0:0".parse::<SocketAddr>().unwrap().into())?;
    Ok(socket.into())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
