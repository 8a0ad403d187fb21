use thiserror::Error;

/// Unified error type for live slides operations
#[derive(Debug, Error)]
pub enum LiveSlidesError {
    // Wire errors
    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error("Unsupported message type '{0}'")]
    UnsupportedMessage(String),

    // Session errors
    #[error("Invalid session id '{0}'")]
    InvalidSessionId(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // Replication errors
    #[error("Invalid sync mode '{0}'. Expected one of: off, master, slave, peer")]
    InvalidSyncMode(String),

    #[error("Sync mode '{mode}' does not {action}")]
    ModeForbids {
        mode: crate::replication::SyncMode,
        action: &'static str,
    },
}

/// Result type alias for live slides operations
pub type Result<T> = std::result::Result<T, LiveSlidesError>;
