//! Small shared helpers for the socket loops.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Granularity at which interval sleeps re-check the stop flag.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Returns `true` for OS timeout / would-block errors that a polling loop
/// should simply retry.
pub(crate) fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// Sleeps for `total`, waking early if `stop` becomes true.
///
/// Returns `true` if the full interval elapsed, `false` if the stop flag
/// cut it short.
pub(crate) fn sleep_with_stop(stop: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(SLEEP_SLICE);
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    !stop.load(Ordering::Relaxed)
}

/// Best-effort detection of this host's outbound LAN address.
///
/// Connecting a UDP socket performs a routing lookup without sending any
/// packet; the socket's local address is then the interface the OS would
/// use to reach the wider network. Falls back to loopback on hosts with no
/// route.
pub(crate) fn local_ip() -> IpAddr {
    let fallback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let Ok(socket) = UdpSocket::bind("0.0.0.0:0") else {
        return fallback;
    };
    if socket.connect("8.8.8.8:80").is_err() {
        return fallback;
    }
    socket.local_addr().map(|a| a.ip()).unwrap_or(fallback)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
