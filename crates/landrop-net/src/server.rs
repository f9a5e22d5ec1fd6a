//! The TCP control server.
//!
//! Binds the first free port in the configured control range and serves
//! every accepted connection on its own thread, so one slow peer never
//! blocks another. Each connection runs a strict one-request-one-response
//! loop; the only departures are the consent handshake (which parks the
//! handler until the operator answers) and an accepted file stream (which
//! switches the socket to blocking chunked receive).
//!
//! The accept loop uses a non-blocking listener polled against the shared
//! stop flag; connection handlers poll the same flag through a short read
//! timeout.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};
use std::thread::JoinHandle;
use std::time::Duration;

use landrop_core::{
    decode_prefix, encode, CodecError, ControlRequest, ControlResponse, RequestKind, WireMessage,
    protocol::messages::{
        CHUNK_ACK_TEXT, CONTROL_BUFFER_SIZE, FILE_CHUNK_SIZE, PING_ACK_TEXT,
        TRANSFER_END_SENTINEL,
    },
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::NetworkConfig;
use crate::context::NodeContext;
use crate::util::is_timeout;

/// Read timeout on connection handlers; doubles as the stop-flag poll rate.
const CONTROL_READ_TIMEOUT: Duration = Duration::from_millis(500);
/// Accept-loop poll interval while no peer is connecting.
const ACCEPT_POLL: Duration = Duration::from_millis(50);
/// Poll interval while a handler waits on the operator's consent decision.
const CONSENT_POLL: Duration = Duration::from_millis(100);

/// Error type for control-server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Every port in the control range is taken. Fatal at startup.
    #[error("no free control port in [{start},{end})")]
    NoFreePort { start: u16, end: u16 },

    /// A peer asked for our identity while nobody is logged in. This is a
    /// broken precondition upstream, not a peer problem.
    #[error("identity requested but no user is logged in")]
    MissingIdentity,

    /// A response could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Socket or filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ── Consent gate ──────────────────────────────────────────────────────────────

/// The pending-consent slot, shared across the whole server.
///
/// One slot, not one per connection: the operator answers one prompt at a
/// time, and the wire protocol has no way to address a specific
/// request anyway. Two simultaneous senders will race for the first answer.
/// Each flag has its own lock.
#[derive(Debug, Default)]
pub struct ConsentGate {
    awaiting: Mutex<bool>,
    decision: Mutex<bool>,
}

impl ConsentGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a consent request as pending. The operator surface polls
    /// [`ConsentGate::is_awaiting`] to know a prompt is due.
    pub fn begin(&self) {
        *self.lock_awaiting() = true;
    }

    /// Records the operator's decision and releases the waiting handler.
    pub fn resolve(&self, allow: bool) {
        *self.lock_decision() = allow;
        *self.lock_awaiting() = false;
    }

    pub fn is_awaiting(&self) -> bool {
        *self.lock_awaiting()
    }

    /// Parks the calling handler until the operator resolves the request or
    /// the server shuts down. No timeout: explicit operator control is
    /// preferred over a fail-safe that answers on the operator's behalf.
    ///
    /// Returns `None` when released by shutdown.
    pub fn wait(&self, stop: &AtomicBool) -> Option<bool> {
        loop {
            if !self.is_awaiting() {
                return Some(*self.lock_decision());
            }
            if stop.load(Ordering::Relaxed) {
                return None;
            }
            std::thread::sleep(CONSENT_POLL);
        }
    }

    fn lock_awaiting(&self) -> std::sync::MutexGuard<'_, bool> {
        self.awaiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_decision(&self) -> std::sync::MutexGuard<'_, bool> {
        self.decision.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Control server ────────────────────────────────────────────────────────────

/// Serves the control protocol for this instance.
pub struct ControlServer {
    config: NetworkConfig,
    context: Arc<dyn NodeContext>,
    consent: Arc<ConsentGate>,
    port: Arc<Mutex<Option<u16>>>,
    stop: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    conn_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ControlServer {
    pub fn new(config: NetworkConfig, context: Arc<dyn NodeContext>) -> Self {
        Self {
            config,
            context,
            consent: Arc::new(ConsentGate::new()),
            port: Arc::new(Mutex::new(None)),
            stop: Arc::new(AtomicBool::new(false)),
            accept_handle: None,
            conn_handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Binds the first free port in the control range and spawns the accept
    /// loop.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NoFreePort`] when the whole range is taken;
    /// no thread is left running in that case.
    pub fn start(&mut self) -> Result<(), ServerError> {
        let (listener, port) = self.bind_first_free_port()?;
        listener.set_nonblocking(true)?;

        *self.port.lock().unwrap_or_else(PoisonError::into_inner) = Some(port);
        self.stop.store(false, Ordering::Relaxed);

        let context = Arc::clone(&self.context);
        let consent = Arc::clone(&self.consent);
        let stop = Arc::clone(&self.stop);
        let conn_handles = Arc::clone(&self.conn_handles);
        let received_dir = self.config.received_files_dir.clone();

        let handle = std::thread::Builder::new()
            .name("landrop-accept".to_string())
            .spawn(move || {
                accept_loop(listener, context, consent, received_dir, stop, conn_handles)
            })?;
        self.accept_handle = Some(handle);

        info!("control server listening on TCP port {port}");
        Ok(())
    }

    /// Signals every server thread to stop and joins them all.
    ///
    /// A handler parked in an in-progress transfer keeps the join waiting
    /// until its peer finishes or disconnects; that latency is accepted.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        let handles: Vec<_> = {
            let mut guard = self
                .conn_handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
        *self.port.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The bound control port, once the server has started.
    pub fn port(&self) -> Option<u16> {
        *self.port.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a peer is currently waiting on the operator's consent.
    pub fn is_awaiting_consent(&self) -> bool {
        self.consent.is_awaiting()
    }

    /// Resolves the pending consent request (if any) with the operator's
    /// decision.
    pub fn resolve_consent(&self, allow: bool) {
        self.consent.resolve(allow);
    }

    fn bind_first_free_port(&self) -> Result<(TcpListener, u16), ServerError> {
        for port in self.config.control_ports() {
            match TcpListener::bind((self.config.bind_addr.as_str(), port)) {
                Ok(listener) => return Ok((listener, port)),
                // Port taken (or otherwise unusable): try the next one.
                Err(e) => debug!("control port {port} unavailable: {e}"),
            }
        }
        Err(ServerError::NoFreePort {
            start: self.config.control_port_start,
            end: self.config.control_port_end,
        })
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

fn accept_loop(
    listener: TcpListener,
    context: Arc<dyn NodeContext>,
    consent: Arc<ConsentGate>,
    received_dir: PathBuf,
    stop: Arc<AtomicBool>,
    conn_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    while !stop.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("accepted control connection from {peer}");
                // Some platforms hand the accepted socket the listener's
                // non-blocking flag; handlers want timeout-based reads.
                stream.set_nonblocking(false).ok();
                stream.set_read_timeout(Some(CONTROL_READ_TIMEOUT)).ok();

                let context = Arc::clone(&context);
                let consent = Arc::clone(&consent);
                let stop = Arc::clone(&stop);
                let received_dir = received_dir.clone();

                let spawned = std::thread::Builder::new()
                    .name("landrop-peer".to_string())
                    .spawn(move || {
                        serve_connection(stream, peer, context, consent, received_dir, stop)
                    });
                match spawned {
                    Ok(handle) => conn_handles
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(handle),
                    Err(e) => error!("failed to spawn connection handler: {e}"),
                }
            }
            Err(e) if is_timeout(&e) => std::thread::sleep(ACCEPT_POLL),
            Err(e) => {
                warn!("accept error: {e}");
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
    info!("control server stopped accepting connections");
}

// ── Per-connection handler ────────────────────────────────────────────────────

fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    context: Arc<dyn NodeContext>,
    consent: Arc<ConsentGate>,
    received_dir: PathBuf,
    stop: Arc<AtomicBool>,
) {
    let mut buf = [0u8; CONTROL_BUFFER_SIZE];
    // Set by a granted consent handshake, consumed by the next SendFile.
    let mut consent_granted = false;

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let n = match stream.read(&mut buf) {
            // Empty read: the peer closed the connection.
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                debug!("control connection to {peer} lost: {e}");
                break;
            }
        };

        let (req, consumed) = match decode_prefix(&buf[..n]) {
            Ok((WireMessage::Request(req), consumed)) => (req, consumed),
            Ok((other, _)) => {
                warn!("unexpected message kind on control channel from {peer}: {other:?}");
                break;
            }
            Err(e) => {
                debug!("undecodable control payload from {peer}: {e}");
                break;
            }
        };
        // A SendFile request may arrive glued to its first file bytes.
        let trailing = buf[consumed..n].to_vec();

        match handle_request(
            &mut stream,
            &req,
            trailing,
            context.as_ref(),
            &consent,
            &received_dir,
            &stop,
            &mut consent_granted,
        ) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                error!("failed to serve {:?} request from {peer}: {e}", req.kind);
                break;
            }
        }
    }
    debug!("control connection from {peer} closed");
}

/// Dispatches one request. `Ok(true)` keeps the connection open, `Ok(false)`
/// closes it cleanly, `Err` closes it with a fault.
#[allow(clippy::too_many_arguments)]
fn handle_request(
    stream: &mut TcpStream,
    req: &ControlRequest,
    trailing: Vec<u8>,
    context: &dyn NodeContext,
    consent: &ConsentGate,
    received_dir: &Path,
    stop: &AtomicBool,
    consent_granted: &mut bool,
) -> Result<bool, ServerError> {
    match req.kind {
        RequestKind::Ping => {
            respond(stream, ControlResponse::text(PING_ACK_TEXT))?;
            Ok(true)
        }

        RequestKind::GetIdentity => {
            let email = context.current_email().ok_or(ServerError::MissingIdentity)?;
            respond(stream, ControlResponse::text(email))?;
            Ok(true)
        }

        RequestKind::HasContact => {
            let Some(email) = req.args.first() else {
                debug!("HasContact request without an email argument");
                return Ok(false);
            };
            respond(stream, ControlResponse::flag(context.is_contact(email)))?;
            Ok(true)
        }

        RequestKind::RequestSendConsent => {
            let Some(sender_email) = req.args.first() else {
                debug!("consent request without a sender argument");
                return Ok(false);
            };
            let Some(sender) = context.contact_by_email(sender_email) else {
                // Unknown senders are denied with zero operator interaction.
                respond(stream, ControlResponse::flag(false))?;
                return Ok(true);
            };

            info!("{sender} wants to send a file; awaiting the operator's decision");
            consent.begin();
            match consent.wait(stop) {
                Some(allow) => {
                    *consent_granted = allow;
                    respond(stream, ControlResponse::flag(allow))?;
                    Ok(true)
                }
                None => {
                    // Shutdown released the wait: deny and close.
                    respond(stream, ControlResponse::flag(false))?;
                    Ok(false)
                }
            }
        }

        RequestKind::SendFile => {
            if !*consent_granted {
                warn!("SendFile without a granted consent; refusing");
                respond(stream, ControlResponse::flag(false))?;
                return Ok(false);
            }
            *consent_granted = false;

            let Some(path_hint) = req.args.first() else {
                debug!("SendFile request without a path argument");
                return Ok(false);
            };
            receive_file(stream, received_dir, path_hint, trailing)
        }
    }
}

fn respond(stream: &mut TcpStream, res: ControlResponse) -> Result<(), ServerError> {
    let bytes = encode(&WireMessage::Response(res))?;
    stream.write_all(&bytes)?;
    Ok(())
}

/// Receives one file as acknowledged chunks, persisting it under the base
/// name of the sender's path hint.
///
/// Blocks (no read timeout) until the sender signals completion with the
/// end-of-transfer sentinel or disconnects. `initial` holds file bytes that
/// arrived in the same read as the request. A sentinel before any chunk
/// yields a zero-length file. On a broken transfer the partial file is
/// deleted.
fn receive_file(
    stream: &mut TcpStream,
    received_dir: &Path,
    path_hint: &str,
    initial: Vec<u8>,
) -> Result<bool, ServerError> {
    let Some(file_name) = Path::new(path_hint).file_name() else {
        debug!("path hint {path_hint:?} has no base name");
        return Ok(false);
    };
    std::fs::create_dir_all(received_dir)?;
    let target = received_dir.join(file_name);

    stream.set_read_timeout(None).ok();
    let outcome = receive_chunks(stream, &target, initial);
    stream.set_read_timeout(Some(CONTROL_READ_TIMEOUT)).ok();

    match outcome {
        Ok(bytes_written) => {
            info!("received {bytes_written} bytes into {}", target.display());
            Ok(true)
        }
        Err(e) => {
            debug!("transfer into {} failed: {e}", target.display());
            let _ = std::fs::remove_file(&target);
            Ok(false)
        }
    }
}

fn receive_chunks(
    stream: &mut TcpStream,
    target: &Path,
    initial: Vec<u8>,
) -> std::io::Result<u64> {
    let mut file = std::fs::File::create(target)?;
    let ack = encode(&WireMessage::Response(ControlResponse::text(CHUNK_ACK_TEXT)))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let mut written: u64 = 0;

    if !initial.is_empty() {
        if initial == TRANSFER_END_SENTINEL {
            return Ok(written);
        }
        file.write_all(&initial)?;
        written += initial.len() as u64;
        stream.write_all(&ack)?;
    }

    let mut chunk = vec![0u8; FILE_CHUNK_SIZE];
    loop {
        let n = match stream.read(&mut chunk) {
            // EOF also ends the transfer; the sender vanished after its
            // last chunk was acknowledged.
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return Err(e),
        };
        if &chunk[..n] == TRANSFER_END_SENTINEL {
            break;
        }
        file.write_all(&chunk[..n])?;
        written += n as u64;
        stream.write_all(&ack)?;
    }
    Ok(written)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
