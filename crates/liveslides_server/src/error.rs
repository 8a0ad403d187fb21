use std::net::SocketAddr;
use std::time::Duration;

use liveslides_core::replication::SyncMode;
use thiserror::Error;

/// Errors starting or stopping the Live Slides hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Live Slides server is already running on {0}")]
    AlreadyRunning(SocketAddr),

    #[error("Failed to bind Live Slides server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors of the network sync engine
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Network sync is already running")]
    AlreadyRunning,

    #[error("Network sync is not running")]
    NotRunning,

    #[error("Network sync mode is off")]
    ModeOff,

    #[error("Sync mode '{0}' requires a remote host")]
    MissingRemote(SyncMode),

    #[error("Failed to bind sync server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to {addr}: {message}")]
    Connect { addr: String, message: String },

    #[error("Handshake with {addr} timed out after {timeout:?}")]
    HandshakeTimeout { addr: String, timeout: Duration },

    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Sync transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Core(#[from] liveslides_core::LiveSlidesError),
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}
