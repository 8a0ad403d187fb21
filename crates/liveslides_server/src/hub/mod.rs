//! Hub/spoke broadcast manager for live slide sessions.
//!
//! The [`Hub`] owns every session. Each session lives in a [`SessionRoom`]
//! whose text mutation and broadcast happen under one lock, so updates to a
//! session are applied and delivered in receipt order while different
//! sessions never wait on each other. A [`ClientConnection`] is the spoke:
//! it turns client frames into hub calls and merges its session channel with
//! the lobby of lifecycle notices.

mod connection;
mod room;

pub use connection::ClientConnection;
pub use room::{ConnectionId, Envelope, Hub, HubStats, SessionRoom, Subscription};
