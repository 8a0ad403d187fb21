//! Network sync between whole application instances.
//!
//! Independent of the hub: its own listener (`/sync`), its own frames and
//! its own entity cache. The [`SyncEngine`] runs a listener (master, peer)
//! and/or one outbound link (slave, peer) and moves between
//! [`EnginePhase`]s as links come and go.
//!
//! ```text
//! connecting side                 accepting side
//!   sync_join      ───────────▶
//!                  ◀───────────   sync_welcome
//!                  ◀───────────   sync_full_state (master / peer)
//!   sync_* mutations ◀────────▶  (per mode matrix)
//! ```

mod client;
mod engine;
mod link;
mod server;

pub use engine::{EnginePhase, ReplicaEvent, SyncEngine};
pub use link::{LinkDirection, LinkId, LinkInfo};
