//! Client-side state of a notepad editor.
//!
//! [`NotepadState`] is transport agnostic: feed it local keystrokes and hub
//! messages, and send whatever [`ClientMessage`] it hands back.

use std::time::Instant;

use crate::guard::{GuardDecision, LocalEditGuard};
use crate::history::ChunkHistory;
use crate::protocol::{ClientMessage, ClientRole, ServerMessage, TranscriptionChunk};
use crate::slides::{Slide, SlideBoundary, compile};

/// What a notepad should do after handling a hub message.
#[derive(Debug, Clone, PartialEq)]
pub enum NotepadEvent {
    /// The buffer was replaced with remote text
    TextReplaced,
    /// Remote text arrived while the user was typing and was ignored
    RemoteIgnored,
    /// Slides changed without touching the buffer
    SlidesRefreshed,
    /// A transcription chunk was recorded
    Transcription(TranscriptionChunk),
    /// The joined session was deleted
    SessionEnded,
    /// The hub reported an error
    HubError(String),
    /// Message was not relevant to this notepad
    Ignored,
}

/// State of one notepad joined to (at most) one session.
#[derive(Debug, Clone)]
pub struct NotepadState {
    session_id: Option<String>,
    role: ClientRole,
    guard: LocalEditGuard,
    slides: Vec<Slide>,
    boundaries: Vec<SlideBoundary>,
    history: ChunkHistory,
}

impl NotepadState {
    /// Create a detached notepad.
    pub fn new(role: ClientRole, history_limit: usize) -> Self {
        Self {
            session_id: None,
            role,
            guard: LocalEditGuard::new(),
            slides: Vec::new(),
            boundaries: Vec::new(),
            history: ChunkHistory::new(history_limit),
        }
    }

    /// Join a session, returning the message to send.
    pub fn join(&mut self, session_id: impl Into<String>) -> ClientMessage {
        let session_id = session_id.into();
        self.session_id = Some(session_id.clone());
        self.slides.clear();
        self.boundaries.clear();
        self.history.clear();
        ClientMessage::JoinSession {
            session_id,
            client_type: self.role,
        }
    }

    /// Handle a local edit, returning a `text_update` if one should be sent.
    pub fn edit(&mut self, text: impl Into<String>, at: Instant) -> Option<ClientMessage> {
        let session_id = self.session_id.clone()?;
        if self.role == ClientRole::Viewer {
            return None;
        }

        self.guard.record_local_edit(text, at);
        let compiled = compile(self.guard.buffer());
        self.slides = compiled.slides;
        self.boundaries = compiled.boundaries;

        if !self.guard.mark_sent() {
            return None;
        }
        Some(ClientMessage::TextUpdate {
            session_id,
            text: self.guard.buffer().to_string(),
        })
    }

    /// Record focus changes of the editor widget.
    pub fn set_focused(&mut self, focused: bool) {
        self.guard.set_focused(focused);
    }

    /// Apply a message pushed by the hub.
    pub fn handle(&mut self, message: ServerMessage, now: Instant) -> NotepadEvent {
        match message {
            ServerMessage::SlidesUpdate {
                session_id,
                slides,
                boundaries,
                raw_text,
            } => {
                if self.session_id.as_deref() != Some(session_id.as_str()) {
                    return NotepadEvent::Ignored;
                }
                match self.guard.offer_remote(&raw_text, now) {
                    GuardDecision::Applied => {
                        self.slides = slides;
                        self.boundaries = boundaries;
                        NotepadEvent::TextReplaced
                    }
                    GuardDecision::Unchanged => {
                        self.slides = slides;
                        self.boundaries = boundaries;
                        NotepadEvent::SlidesRefreshed
                    }
                    GuardDecision::KeptLocal => NotepadEvent::RemoteIgnored,
                }
            }
            ServerMessage::TranscriptionStream(chunk) => {
                self.history.push(chunk.clone());
                NotepadEvent::Transcription(chunk)
            }
            ServerMessage::SessionDeleted { session_id } => {
                if self.session_id.as_deref() == Some(session_id.as_str()) {
                    self.session_id = None;
                    NotepadEvent::SessionEnded
                } else {
                    NotepadEvent::Ignored
                }
            }
            ServerMessage::Error { message } => NotepadEvent::HubError(message),
            ServerMessage::SessionCreated { .. } | ServerMessage::SessionsList { .. } => {
                NotepadEvent::Ignored
            }
        }
    }

    /// Joined session, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Current editor text.
    pub fn text(&self) -> &str {
        self.guard.buffer()
    }

    /// Slides for the current text.
    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    /// Boundaries used to paint the editor gutter.
    pub fn boundaries(&self) -> &[SlideBoundary] {
        &self.boundaries
    }

    /// Recently received transcription chunks.
    pub fn history(&self) -> &ChunkHistory {
        &self.history
    }
}
