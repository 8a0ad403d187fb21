//! Core library for Live Slides.
//!
//! Turns free-form notepad text into slides, models the shared editing
//! sessions and their wire protocol, and provides the replication model used
//! to keep playlists and the schedule consistent across instances. Nothing in
//! this crate performs I/O; the server crate wires it to sockets.

/// Error (common error types)
pub mod error;

/// Text to slide compilation
pub mod slides;

/// Shared editing sessions
pub mod session;

/// Hub wire protocol (client and server messages)
pub mod protocol;

/// Local edit conflict guard
pub mod guard;

/// Transcription catch-up buffer
pub mod history;

/// Client-side notepad state
pub mod notepad;

/// Playlist and schedule replication
pub mod replication;

pub use error::{LiveSlidesError, Result};
pub use protocol::{ClientMessage, ClientRole, ServerMessage, TranscriptionChunk};
pub use session::Session;
pub use slides::{CompiledText, Slide, SlideBoundary, SlideItem, compile};
