//! Live Slides Server
//!
//! Hosts live slide sessions for notepad editors and viewers, and replicates
//! playlists and the run-of-show schedule with other application instances.
//!
//! ## Features
//!
//! - **Hub/spoke sessions**: WebSocket endpoint `/ws` where notepads edit and
//!   viewers watch compiled slides in real time
//! - **Transcription relay**: live transcription chunks forwarded to session
//!   subscribers, with catch-up for late joiners
//! - **Network sync**: master/slave/peer replication over a second WebSocket
//!   endpoint `/sync` with last-writer-wins conflict resolution
//! - **HTTP snapshots**: read-only `/api/sessions` and `/api/status`
//!
//! Neither endpoint authenticates or encrypts traffic.
//!
//! ## Environment Variables
//!
//! - `HOST`: Bind host (default: 0.0.0.0)
//! - `LIVE_SLIDES_PORT`: Hub port (default: 9876)
//! - `LIVE_SLIDES_AUTO_START`: Start the hub on launch (default: true)
//! - `SYNC_MODE`: off, master, slave or peer (default: off)
//! - `SYNC_PORT`: Sync listener port (default: 9877)
//! - `SYNC_REMOTE_HOST` / `SYNC_REMOTE_PORT`: Instance to connect to
//! - `SYNC_PLAYLISTS` / `SYNC_SCHEDULE`: Replicated streams (default: true)
//! - `SYNC_AUTO_CONNECT`: Start network sync on launch (default: false)
//! - `SYNC_HANDSHAKE_TIMEOUT_SECS`: Outbound handshake bound (default: 5)
//! - `SESSION_CHANNEL_CAPACITY`: Per-session broadcast queue (default: 256)
//! - `TRANSCRIPT_HISTORY_LIMIT`: Chunks replayed to joiners (default: 50)
//! - `CORS_ORIGINS`: Comma-separated list of allowed origins (default: *)

pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod netsync;
pub mod server;

pub use config::Config;
pub use error::{HubError, SyncError};
pub use server::LiveSlidesServer;
