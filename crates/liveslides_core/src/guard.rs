//! Local-edit conflict guard.
//!
//! Every notepad decides on its own whether a text broadcast from the hub may
//! overwrite what its user is typing. The person actively typing wins; an
//! idle, unfocused or empty editor always converges to the remote text.

use std::time::{Duration, Instant};

/// How long after a keystroke local edits take precedence over remote text.
pub const RECENT_EDIT_WINDOW: Duration = Duration::from_millis(800);

/// Outcome of offering a remote update to the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// The remote text replaced the local buffer
    Applied,
    /// The local buffer was kept because the user is typing
    KeptLocal,
    /// The remote text already matches the local buffer
    Unchanged,
}

/// Per-client editing state consulted before applying remote text.
#[derive(Debug, Clone)]
pub struct LocalEditGuard {
    buffer: String,
    last_sent: Option<String>,
    last_local_edit: Option<Instant>,
    focused: bool,
    window: Duration,
}

impl Default for LocalEditGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEditGuard {
    /// Guard with the default recency window.
    pub fn new() -> Self {
        Self::with_window(RECENT_EDIT_WINDOW)
    }

    /// Guard with a custom recency window.
    pub fn with_window(window: Duration) -> Self {
        Self {
            buffer: String::new(),
            last_sent: None,
            last_local_edit: None,
            focused: false,
            window,
        }
    }

    /// Current editor contents.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Text most recently sent to the hub.
    pub fn last_sent(&self) -> Option<&str> {
        self.last_sent.as_deref()
    }

    /// Whether the editor has input focus.
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Record editor focus changes.
    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    /// Record a keystroke batch that changed the buffer.
    pub fn record_local_edit(&mut self, text: impl Into<String>, at: Instant) {
        self.buffer = text.into();
        self.last_local_edit = Some(at);
    }

    /// Record that the buffer was sent to the hub.
    ///
    /// Returns `false` when the buffer matches what was last sent, so callers
    /// can skip redundant `text_update`s.
    pub fn mark_sent(&mut self) -> bool {
        if self.last_sent.as_deref() == Some(self.buffer.as_str()) {
            return false;
        }
        self.last_sent = Some(self.buffer.clone());
        true
    }

    /// Whether a remote update arriving at `now` should overwrite the buffer.
    pub fn should_apply_remote(&self, now: Instant) -> bool {
        let recently_edited = self
            .last_local_edit
            .is_some_and(|at| now.saturating_duration_since(at) < self.window);

        !(self.focused && recently_edited && !self.buffer.is_empty())
    }

    /// Offer remote text to the guard, applying it when allowed.
    pub fn offer_remote(&mut self, text: &str, now: Instant) -> GuardDecision {
        if self.buffer == text {
            self.last_sent = Some(text.to_string());
            return GuardDecision::Unchanged;
        }
        if !self.should_apply_remote(now) {
            return GuardDecision::KeptLocal;
        }
        self.buffer = text.to_string();
        self.last_sent = Some(text.to_string());
        GuardDecision::Applied
    }
}
