use std::env;
use std::str::FromStr;
use std::time::Duration;

use liveslides_core::history::DEFAULT_HISTORY_LIMIT;
use liveslides_core::replication::{DEFAULT_SYNC_PORT, SyncMode, SyncSettings};

/// Default port of the Live Slides hub
pub const DEFAULT_HUB_PORT: u16 = 9876;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Hub port (default: 9876)
    pub port: u16,
    /// Start the hub together with the process (default: true)
    pub auto_start: bool,
    /// Network sync configuration
    pub sync: SyncSettings,
    /// How long an outbound sync handshake may take (default: 5s)
    pub handshake_timeout: Duration,
    /// Capacity of each session's broadcast channel (default: 256)
    pub session_channel_capacity: usize,
    /// Transcription chunks kept per session for late joiners (default: 50)
    pub transcript_history_limit: usize,
    /// CORS allowed origins (comma-separated, `*` for any)
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_HUB_PORT,
            auto_start: true,
            sync: SyncSettings::default(),
            handshake_timeout: Duration::from_secs(5),
            session_channel_capacity: 256,
            transcript_history_limit: DEFAULT_HISTORY_LIMIT,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_var("LIVE_SLIDES_PORT", DEFAULT_HUB_PORT)
            .map_err(|_| ConfigError::InvalidPort("LIVE_SLIDES_PORT"))?;
        let auto_start = parse_flag("LIVE_SLIDES_AUTO_START", true)?;

        let mode = env::var("SYNC_MODE")
            .unwrap_or_default()
            .parse::<SyncMode>()
            .map_err(|e| ConfigError::InvalidSyncMode(e.to_string()))?;

        let sync = SyncSettings {
            mode,
            server_port: parse_var("SYNC_PORT", DEFAULT_SYNC_PORT)
                .map_err(|_| ConfigError::InvalidPort("SYNC_PORT"))?,
            remote_host: env::var("SYNC_REMOTE_HOST")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            remote_port: parse_var("SYNC_REMOTE_PORT", DEFAULT_SYNC_PORT)
                .map_err(|_| ConfigError::InvalidPort("SYNC_REMOTE_PORT"))?,
            sync_playlists: parse_flag("SYNC_PLAYLISTS", true)?,
            sync_schedule: parse_flag("SYNC_SCHEDULE", true)?,
            auto_connect: parse_flag("SYNC_AUTO_CONNECT", false)?,
        };

        let handshake_timeout = Duration::from_secs(
            parse_var("SYNC_HANDSHAKE_TIMEOUT_SECS", 5u64)
                .map_err(|_| ConfigError::InvalidNumber("SYNC_HANDSHAKE_TIMEOUT_SECS"))?,
        );

        let session_channel_capacity = parse_var("SESSION_CHANNEL_CAPACITY", 256usize)
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::InvalidNumber("SESSION_CHANNEL_CAPACITY"))?;

        let transcript_history_limit =
            parse_var("TRANSCRIPT_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)
                .map_err(|_| ConfigError::InvalidNumber("TRANSCRIPT_HISTORY_LIMIT"))?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Config {
            host,
            port,
            auto_start,
            sync,
            handshake_timeout,
            session_channel_capacity,
            transcript_history_limit,
            cors_origins,
        })
    }

    /// Get the hub address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether any origin may call the HTTP endpoints
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, T::Err> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse(),
        _ => Ok(default),
    }
}

fn parse_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag(name)),
        },
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort(&'static str),
    InvalidFlag(&'static str),
    InvalidNumber(&'static str),
    InvalidSyncMode(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort(name) => write!(f, "Invalid {} environment variable", name),
            ConfigError::InvalidFlag(name) => {
                write!(f, "Invalid {} environment variable (expected true/false)", name)
            }
            ConfigError::InvalidNumber(name) => write!(f, "Invalid {} environment variable", name),
            ConfigError::InvalidSyncMode(message) => write!(f, "Invalid SYNC_MODE: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 9876);
        assert_eq!(config.sync.server_port, 9877);
        assert_eq!(config.sync.mode, SyncMode::Off);
        assert!(config.auto_start);
        assert!(config.allows_any_origin());
        assert_eq!(config.server_addr(), "0.0.0.0:9876");
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::InvalidPort("SYNC_PORT").to_string(),
            "Invalid SYNC_PORT environment variable"
        );
        assert!(
            ConfigError::InvalidSyncMode("bad".to_string())
                .to_string()
                .starts_with("Invalid SYNC_MODE")
        );
    }
}
