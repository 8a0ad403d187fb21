//! Replication of playlists and the schedule between application instances.
//!
//! # Architecture
//!
//! ```text
//! Master / Peer  ──sync_* frames──▶  Slave / Peer
//!       ↑↓                                 ↑↓
//!  ReplicaStore (LWW)               ReplicaStore (LWW)
//! ```
//!
//! Every mutation carries a millisecond timestamp. A replica applies a write
//! only when it is strictly newer than the last write it applied for the same
//! entity; deletes leave a tombstone timestamp behind. A full state is an
//! authoritative baseline and replaces what the replica had.
//!
//! # Key Components
//!
//! - [`SyncMode`] / [`SyncSettings`] - Role of this instance and where to connect
//! - [`SyncMessage`] - Wire frames
//! - [`ReplicaStore`] - Local cache applying last-writer-wins
//! - [`splice_automations`] - Keeps local-only schedule automations

/// Playlist and schedule types
pub mod entities;
/// Wire frames of the sync protocol
pub mod message;
/// Sync modes and settings
pub mod mode;
/// Last-writer-wins replica
pub mod store;

pub use entities::{Automation, Playlist, PlaylistItem, Schedule, ScheduleItem, splice_automations};
pub use message::{ItemAction, SyncMessage, may_send};
pub use mode::{DEFAULT_SYNC_PORT, SyncConnectionState, SyncMode, SyncSettings};
pub use store::{ApplyOutcome, MAX_CLOCK_SKEW_MS, MonotonicClock, ReplicaStore, SyncScope};
