//! The registry of live peer connections.
//!
//! The registry is the only multi-writer structure in the subsystem. Every
//! operation (insertion, removal, lookup, the liveness sweep, and the
//! request/response cycles the discovery listener runs against a peer)
//! happens under one exclusive lock. Holding the lock across socket I/O is
//! what guarantees each socket is used by exactly one thread at a time and
//! that requests on one connection never interleave.
//!
//! O(n) scans throughout: the registry holds one entry per reachable LAN
//! peer, so n stays small.

use std::net::TcpStream;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use landrop_core::InstanceId;
use tracing::{debug, warn};

use crate::client;

/// Read timeout applied while a liveness probe is in flight, so one wedged
/// peer cannot stall the whole sweep.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A live, identity-verified connection to one peer instance.
///
/// Created by the discovery listener after a successful identity query and
/// owned exclusively by the registry from then on; other code touches it
/// only inside [`ConnectionRegistry::with_connection`].
#[derive(Debug)]
pub struct Connection {
    pub instance_id: InstanceId,
    pub peer_email: String,
    pub stream: TcpStream,
}

impl Connection {
    pub fn new(instance_id: InstanceId, peer_email: impl Into<String>, stream: TcpStream) -> Self {
        Self {
            instance_id,
            peer_email: peer_email.into(),
            stream,
        }
    }
}

/// Thread-safe table of live peer connections, keyed by instance id.
#[derive(Debug)]
pub struct ConnectionRegistry {
    local_id: InstanceId,
    connections: Mutex<Vec<Connection>>,
}

impl ConnectionRegistry {
    pub fn new(local_id: InstanceId) -> Self {
        Self {
            local_id,
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn local_id(&self) -> InstanceId {
        self.local_id
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Connection>> {
        // A panic mid-operation leaves the list structurally intact, so a
        // poisoned lock is still usable.
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a connection, enforcing the registry invariants: the local
    /// instance id never enters, and at most one connection exists per
    /// instance id. Returns whether the connection was stored.
    pub fn add(&self, conn: Connection) -> bool {
        if conn.instance_id == self.local_id {
            warn!("refusing to register a connection under the local instance id");
            return false;
        }
        let mut connections = self.lock();
        if connections.iter().any(|c| c.instance_id == conn.instance_id) {
            debug!(instance_id = %conn.instance_id, "already connected, ignoring");
            return false;
        }
        connections.push(conn);
        true
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.lock().iter().any(|c| c.instance_id == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes every connection whose id is in `ids`, by rebuilding the
    /// list (never mutating mid-scan). Dropping a connection closes its
    /// socket.
    pub fn remove(&self, ids: &[InstanceId]) {
        if ids.is_empty() {
            return;
        }
        let mut connections = self.lock();
        connections.retain(|c| !ids.contains(&c.instance_id));
    }

    /// Drops every connection. Used on shutdown.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Runs `f` with exclusive access to the connection whose peer email
    /// matches `email` (case-insensitive). Socket I/O inside `f` is
    /// serialized with every other registry operation, which is exactly the
    /// single-in-flight-per-connection ordering the protocol requires.
    ///
    /// Returns `None` when no such connection exists.
    pub fn with_connection<R>(
        &self,
        email: &str,
        f: impl FnOnce(&mut Connection) -> R,
    ) -> Option<R> {
        let mut connections = self.lock();
        connections
            .iter_mut()
            .find(|c| c.peer_email.eq_ignore_ascii_case(email))
            .map(f)
    }

    /// Liveness sweep primitive: pings every connection in one pass and
    /// returns the ids that failed to answer. Nothing is removed here;
    /// the caller removes the failures after the full scan, so the sweep
    /// never mutates the list it is walking.
    pub fn probe_all(&self) -> Vec<InstanceId> {
        let mut connections = self.lock();
        let mut dead = Vec::new();
        for conn in connections.iter_mut() {
            conn.stream.set_read_timeout(Some(PROBE_TIMEOUT)).ok();
            let alive = client::ping(&mut conn.stream);
            conn.stream.set_read_timeout(None).ok();
            if !alive {
                dead.push(conn.instance_id);
            }
        }
        dead
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use uuid::Uuid;

    /// A connected socket pair; the accepted end is dropped, which is fine
    /// for tests that never do I/O through the registry.
    fn loopback_stream() -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).expect("connect");
        let _ = listener.accept().expect("accept");
        stream
    }

    fn make_connection(email: &str) -> Connection {
        Connection::new(Uuid::new_v4(), email, loopback_stream())
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_stores_a_connection() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        let conn = make_connection("alice@example.com");
        let id = conn.instance_id;

        assert!(registry.add(conn));
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_rejects_duplicate_instance_id() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        let first = make_connection("alice@example.com");
        let id = first.instance_id;
        registry.add(first);

        let duplicate = Connection::new(id, "alice@example.com", loopback_stream());
        assert!(!registry.add(duplicate), "duplicate id must be a no-op");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_rejects_the_local_instance_id() {
        let local_id = Uuid::new_v4();
        let registry = ConnectionRegistry::new(local_id);

        // Whatever email or socket the entry carries, the local id never
        // enters the table.
        let conn = Connection::new(local_id, "self@example.com", loopback_stream());
        assert!(!registry.add(conn));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_drops_exactly_the_named_ids() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        let keep = make_connection("keep@example.com");
        let drop_a = make_connection("a@example.com");
        let drop_b = make_connection("b@example.com");
        let keep_id = keep.instance_id;
        let dead = vec![drop_a.instance_id, drop_b.instance_id];

        registry.add(keep);
        registry.add(drop_a);
        registry.add(drop_b);
        registry.remove(&dead);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(keep_id));
    }

    #[test]
    fn test_remove_with_empty_set_is_a_no_op() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        registry.add(make_connection("alice@example.com"));
        registry.remove(&[]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_with_connection_resolves_email_case_insensitively() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        registry.add(make_connection("Alice@Example.com"));

        let found = registry.with_connection("alice@EXAMPLE.COM", |conn| {
            conn.peer_email.clone()
        });
        assert_eq!(found.as_deref(), Some("Alice@Example.com"));
    }

    #[test]
    fn test_with_connection_returns_none_for_unknown_email() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        registry.add(make_connection("alice@example.com"));

        let found = registry.with_connection("stranger@example.com", |_| ());
        assert!(found.is_none());
    }

    #[test]
    fn test_clear_drops_everything() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        registry.add(make_connection("a@example.com"));
        registry.add(make_connection("b@example.com"));
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_probe_all_reports_closed_peers_without_removing_them() {
        let registry = ConnectionRegistry::new(Uuid::new_v4());
        // The accepted end of the loopback pair is already dropped, so the
        // probe's write or read fails immediately.
        let conn = make_connection("gone@example.com");
        let id = conn.instance_id;
        registry.add(conn);

        let dead = registry.probe_all();
        assert_eq!(dead, vec![id]);
        // The scan itself must not mutate the table.
        assert_eq!(registry.len(), 1);

        registry.remove(&dead);
        assert!(registry.is_empty());
    }
}
