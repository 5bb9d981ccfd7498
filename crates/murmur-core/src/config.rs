//! Configuration system for Murmur.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MURMUR_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/murmur/config.toml
//!   3. ~/.config/murmur/config.toml

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wire::{
    CONNECT_TIMEOUT_MS, DISCOVERY_INTERVAL_MS, DISCOVERY_PORT, HANDSHAKE_TIMEOUT_MS,
    MAX_FRAME_BYTES, WRITE_TIMEOUT_MS,
};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    pub node: NodeSettings,
    pub network: NetworkConfig,
    pub daemon: DaemonSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Human-readable node name, carried in every announcement.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local address for both the discovery socket and the TCP listener.
    pub bind_address: Ipv4Addr,
    /// UDP discovery port. Every node on the network must use the same one.
    pub discovery_port: u16,
    /// Send discovery pings to the broadcast address.
    pub broadcast: bool,
    pub broadcast_address: Ipv4Addr,
    /// Extra unicast discovery targets, for networks that filter broadcast.
    pub seed_peers: Vec<SocketAddr>,
    /// TCP listening port. 0 = OS-assigned.
    pub tcp_port: u16,
    /// Address advertised to peers. Unset = the bound address; peers fall back
    /// to the datagram source when the advertised address is unspecified.
    pub advertise_address: Option<Ipv4Addr>,
    pub discovery_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    /// Longest a single frame write may block before the peer is dropped.
    pub write_timeout_ms: u64,
    /// Largest accepted TCP frame body.
    pub max_frame_bytes: u32,
    /// Route online publications only to peers that announced the topic.
    /// Off by default: publications go to every verified peer.
    pub filter_by_interest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Topics the daemon subscribes to (online and offline) and logs.
    pub subscribe: Vec<String>,
    /// Peer table snapshot interval. 0 = never.
    pub status_interval_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: "murmur".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: Ipv4Addr::UNSPECIFIED,
            discovery_port: DISCOVERY_PORT,
            broadcast: true,
            broadcast_address: Ipv4Addr::BROADCAST,
            seed_peers: Vec::new(),
            tcp_port: 0,
            advertise_address: None,
            discovery_interval_ms: DISCOVERY_INTERVAL_MS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            handshake_timeout_ms: HANDSHAKE_TIMEOUT_MS,
            write_timeout_ms: WRITE_TIMEOUT_MS,
            max_frame_bytes: MAX_FRAME_BYTES,
            filter_by_interest: false,
        }
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            subscribe: Vec::new(),
            status_interval_secs: 5,
        }
    }
}

impl NetworkConfig {
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Loopback-only settings: no broadcast, ephemeral ports, short timers.
    /// Nodes built this way find each other only through `seed_peers`.
    pub fn loopback(discovery_port: u16) -> Self {
        Self {
            bind_address: Ipv4Addr::LOCALHOST,
            discovery_port,
            broadcast: false,
            discovery_interval_ms: 200,
            connect_timeout_ms: 1000,
            handshake_timeout_ms: 2000,
            ..Self::default()
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("murmur")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MurmurConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            MurmurConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MURMUR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MurmurConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply MURMUR_* overrides. `lookup` resolves a variable name.
    /// Unparsable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |v: String| v == "true" || v == "1";

        if let Some(v) = lookup("MURMUR_NODE__NAME") {
            self.node.name = v;
        }
        if let Some(p) = lookup("MURMUR_NETWORK__DISCOVERY_PORT").and_then(|v| v.parse().ok()) {
            self.network.discovery_port = p;
        }
        if let Some(p) = lookup("MURMUR_NETWORK__TCP_PORT").and_then(|v| v.parse().ok()) {
            self.network.tcp_port = p;
        }
        if let Some(a) = lookup("MURMUR_NETWORK__BROADCAST_ADDRESS").and_then(|v| v.parse().ok()) {
            self.network.broadcast_address = a;
        }
        if let Some(v) = lookup("MURMUR_NETWORK__BROADCAST") {
            self.network.broadcast = flag(v);
        }
        if let Some(v) = lookup("MURMUR_NETWORK__SEED_PEERS") {
            self.network.seed_peers = v
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
        }
        if let Some(v) = lookup("MURMUR_NETWORK__FILTER_BY_INTEREST") {
            self.network.filter_by_interest = flag(v);
        }
    }
}
