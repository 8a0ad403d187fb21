//! Sync modes and settings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::LiveSlidesError;

/// Default port of the network sync endpoint.
pub const DEFAULT_SYNC_PORT: u16 = 9877;

/// Replication role of this application instance.
///
/// | Mode   | Accepts inbound | Sends mutations | Applies received |
/// |--------|-----------------|-----------------|------------------|
/// | off    | no              | no              | no               |
/// | master | yes             | yes             | no               |
/// | slave  | no (connects)   | no              | yes              |
/// | peer   | yes             | yes             | yes              |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Off,
    Master,
    Slave,
    Peer,
}

impl SyncMode {
    /// Whether this mode runs a listener for other instances.
    pub fn accepts_inbound(self) -> bool {
        matches!(self, SyncMode::Master | SyncMode::Peer)
    }

    /// Whether this mode opens a connection to a remote instance.
    pub fn connects_out(self) -> bool {
        matches!(self, SyncMode::Slave | SyncMode::Peer)
    }

    /// Whether this mode publishes its own playlist and schedule changes.
    pub fn sends_mutations(self) -> bool {
        matches!(self, SyncMode::Master | SyncMode::Peer)
    }

    /// Whether this mode applies mutations received from the wire.
    pub fn applies_mutations(self) -> bool {
        matches!(self, SyncMode::Slave | SyncMode::Peer)
    }

    /// Wire / configuration name.
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Off => "off",
            SyncMode::Master => "master",
            SyncMode::Slave => "slave",
            SyncMode::Peer => "peer",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = LiveSlidesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "" => Ok(SyncMode::Off),
            "master" => Ok(SyncMode::Master),
            "slave" => Ok(SyncMode::Slave),
            "peer" => Ok(SyncMode::Peer),
            other => Err(LiveSlidesError::InvalidSyncMode(other.to_string())),
        }
    }
}

/// Network sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SyncSettings {
    pub mode: SyncMode,
    /// Port the inbound listener binds (master / peer)
    pub server_port: u16,
    /// Host to connect to (slave / peer)
    pub remote_host: Option<String>,
    pub remote_port: u16,
    pub sync_playlists: bool,
    pub sync_schedule: bool,
    /// Start the engine together with the application
    pub auto_connect: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode: SyncMode::Off,
            server_port: DEFAULT_SYNC_PORT,
            remote_host: None,
            remote_port: DEFAULT_SYNC_PORT,
            sync_playlists: true,
            sync_schedule: true,
            auto_connect: false,
        }
    }
}

impl SyncSettings {
    /// `host:port` of the remote instance, if one is configured.
    pub fn remote_addr(&self) -> Option<String> {
        self.remote_host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(|host| format!("{}:{}", host, self.remote_port))
    }
}

/// Health of the network sync engine, rebuilt from live connections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConnectionState {
    pub server_running: bool,
    pub client_connected: bool,
    pub connected_clients: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
