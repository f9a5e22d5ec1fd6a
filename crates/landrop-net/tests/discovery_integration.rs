//! End-to-end discovery tests: two full orchestrators on loopback finding
//! each other through real UDP announcements and TCP identity handshakes.
//!
//! Each instance listens on its own discovery port and aims its
//! announcements at the other's, which stands in for a shared broadcast
//! medium without relying on broadcast delivery inside a test runner.
//! Intervals are shortened so every scenario resolves within a couple of
//! discovery cycles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use landrop_core::{Contact, ContactBook};
use landrop_net::{FixedContext, NetworkConfig, NetworkOrchestrator};

fn node_config(discovery_port: u16, peer_port: u16, control_start: u16) -> NetworkConfig {
    NetworkConfig {
        bind_addr: "127.0.0.1".to_string(),
        announce_ip: Some("127.0.0.1".to_string()),
        broadcast_addr: "127.0.0.1".to_string(),
        discovery_port,
        announce_port: peer_port,
        control_port_start: control_start,
        control_port_end: control_start + 5,
        broadcast_interval_ms: 200,
        sweep_interval_ms: 300,
        ..NetworkConfig::default()
    }
}

fn context(own_email: &str, contact: Option<(&str, &str)>) -> Arc<FixedContext> {
    let mut book = ContactBook::new();
    if let Some((name, email)) = contact {
        book.add(Contact::new(name, email)).unwrap();
    }
    Arc::new(FixedContext::new(own_email, book))
}

fn wait_until(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    predicate()
}

#[test]
fn test_mutual_contacts_discover_and_reciprocate_both_ways() {
    let ctx_a = context("alice@example.com", Some(("Bob", "bob@example.com")));
    let ctx_b = context("bob@example.com", Some(("Alice", "alice@example.com")));

    let mut a = NetworkOrchestrator::new(node_config(24510, 24511, 24520), ctx_a);
    let mut b = NetworkOrchestrator::new(node_config(24511, 24510, 24525), ctx_b);
    a.start().expect("start a");
    b.start().expect("start b");

    // Within a couple of discovery cycles each side holds a connection to
    // the other.
    assert!(
        wait_until(Duration::from_secs(6), || {
            a.connection_count() == 1 && b.connection_count() == 1
        }),
        "both instances must connect to each other"
    );

    let bob = Contact::new("Bob", "bob@example.com");
    let alice = Contact::new("Alice", "alice@example.com");
    assert!(a.has_reciprocated(&bob), "B added A back");
    assert!(b.has_reciprocated(&alice), "A added B back");

    // Duplicate announcements keep arriving the whole time; the registry
    // must stay at exactly one entry per peer instance.
    std::thread::sleep(Duration::from_millis(600));
    assert_eq!(a.connection_count(), 1);
    assert_eq!(b.connection_count(), 1);

    a.stop();
    b.stop();
}

#[test]
fn test_reciprocation_is_false_when_the_peer_never_added_us() {
    // B is online and reachable but has an empty contact book.
    let ctx_a = context("alice@example.com", Some(("Bob", "bob@example.com")));
    let ctx_b = context("bob@example.com", None);

    let mut a = NetworkOrchestrator::new(node_config(24512, 24513, 24530), ctx_a);
    let mut b = NetworkOrchestrator::new(node_config(24513, 24512, 24535), ctx_b);
    a.start().expect("start a");
    b.start().expect("start b");

    assert!(
        wait_until(Duration::from_secs(6), || a.connection_count() == 1),
        "discovery is contact-agnostic; the connection must still form"
    );

    let bob = Contact::new("Bob", "bob@example.com");
    assert!(
        !a.has_reciprocated(&bob),
        "reciprocation requires membership in the peer's book"
    );

    a.stop();
    b.stop();
}

#[test]
fn test_a_stopped_peer_is_swept_out_within_one_interval() {
    let ctx_a = context("alice@example.com", Some(("Bob", "bob@example.com")));
    let ctx_b = context("bob@example.com", Some(("Alice", "alice@example.com")));

    let mut a = NetworkOrchestrator::new(node_config(24514, 24515, 24540), ctx_a);
    let mut b = NetworkOrchestrator::new(node_config(24515, 24514, 24545), ctx_b);
    a.start().expect("start a");
    b.start().expect("start b");

    assert!(
        wait_until(Duration::from_secs(6), || a.connection_count() == 1),
        "peers must connect first"
    );

    // B goes away; its sockets close as its threads are joined.
    b.stop();

    assert!(
        wait_until(Duration::from_secs(4), || a.connection_count() == 0),
        "the liveness sweep must drop the dead connection"
    );

    let bob = Contact::new("Bob", "bob@example.com");
    assert!(!a.has_reciprocated(&bob), "availability is gone with the peer");

    a.stop();
}
