//! Network configuration.
//!
//! All values carry serde defaults so a partial (or absent) TOML section
//! yields the stock deployment: discovery on UDP 9999, control servers
//! on the first free TCP port in [1100, 1120), a 1 s announce cadence and a
//! 3 s liveness sweep.

use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Ports, addresses, and cadences for the networking subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// UDP port this instance listens on for peer announcements.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Destination address for outgoing announcements.
    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: String,
    /// Destination UDP port for outgoing announcements. Normally equal to
    /// `discovery_port`; split out so two instances on one host can point
    /// at each other.
    #[serde(default = "default_discovery_port")]
    pub announce_port: u16,
    /// IP address advertised in announcements. `None` auto-detects the
    /// outbound interface address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce_ip: Option<String>,
    /// Address all listening sockets bind to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// First TCP port tried for the control server (inclusive).
    #[serde(default = "default_control_port_start")]
    pub control_port_start: u16,
    /// End of the control-port range (exclusive).
    #[serde(default = "default_control_port_end")]
    pub control_port_end: u16,
    /// Milliseconds between announcement broadcasts.
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,
    /// Milliseconds between liveness sweeps of the connection registry.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Directory where consented inbound files are written.
    #[serde(default = "default_received_files_dir")]
    pub received_files_dir: PathBuf,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_discovery_port() -> u16 {
    9999
}
fn default_broadcast_addr() -> String {
    "255.255.255.255".to_string()
}
fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_control_port_start() -> u16 {
    1100
}
fn default_control_port_end() -> u16 {
    1120
}
fn default_broadcast_interval_ms() -> u64 {
    1000
}
fn default_sweep_interval_ms() -> u64 {
    3000
}
fn default_received_files_dir() -> PathBuf {
    PathBuf::from("received_files")
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            broadcast_addr: default_broadcast_addr(),
            announce_port: default_discovery_port(),
            announce_ip: None,
            bind_addr: default_bind_addr(),
            control_port_start: default_control_port_start(),
            control_port_end: default_control_port_end(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            received_files_dir: default_received_files_dir(),
        }
    }
}

impl NetworkConfig {
    /// Candidate ports for the control server, in bind order.
    pub fn control_ports(&self) -> Range<u16> {
        self.control_port_start..self.control_port_end
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values_are_sensible() {
        let cfg = NetworkConfig::default();
        assert_eq!(cfg.discovery_port, 9999);
        assert_eq!(cfg.announce_port, 9999);
        assert_eq!(cfg.broadcast_addr, "255.255.255.255");
        assert_eq!(cfg.control_ports(), 1100..1120);
        assert_eq!(cfg.broadcast_interval(), Duration::from_secs(1));
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(3));
        assert_eq!(cfg.received_files_dir, PathBuf::from("received_files"));
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: NetworkConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, NetworkConfig::default());
    }

    #[test]
    fn test_deserialize_partial_toml_overrides_only_named_fields() {
        let cfg: NetworkConfig = toml::from_str(
            r#"
discovery_port = 12000
sweep_interval_ms = 500
"#,
        )
        .expect("deserialize partial");

        assert_eq!(cfg.discovery_port, 12000);
        assert_eq!(cfg.sweep_interval(), Duration::from_millis(500));
        // Unnamed fields keep their defaults.
        assert_eq!(cfg.broadcast_addr, "255.255.255.255");
        assert_eq!(cfg.control_ports(), 1100..1120);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = NetworkConfig::default();
        cfg.announce_ip = Some("127.0.0.1".to_string());
        cfg.control_port_start = 2200;
        cfg.control_port_end = 2210;

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: NetworkConfig = toml::from_str(&text).expect("deserialize");
        assert_eq!(restored, cfg);
    }
}
