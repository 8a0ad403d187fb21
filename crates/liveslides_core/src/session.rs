//! Live slide sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::slides::{CompiledText, Slide, SlideBoundary, compile};

/// A named block of collaboratively edited text and its compiled slides.
///
/// The only way to change the text is [`Session::apply_text`], which always
/// recompiles, so `slides` never drifts from `raw_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    name: String,
    raw_text: String,
    slides: Vec<Slide>,
    boundaries: Vec<SlideBoundary>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            raw_text: String::new(),
            slides: Vec::new(),
            boundaries: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the text and recompile the slides.
    pub fn apply_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        let CompiledText { slides, boundaries } = compile(&text);
        self.raw_text = text;
        self.slides = slides;
        self.boundaries = boundaries;
        self.updated_at = Utc::now();
    }

    /// Session id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current authoritative text.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Slides compiled from [`Session::raw_text`].
    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    /// Line boundaries compiled alongside the slides.
    pub fn boundaries(&self) -> &[SlideBoundary] {
        &self.boundaries
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the text last changed.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Parse a session id received over the wire.
pub fn parse_session_id(raw: &str) -> crate::error::Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| crate::error::LiveSlidesError::InvalidSessionId(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new("Sunday service");
        assert_eq!(session.name(), "Sunday service");
        assert!(session.raw_text().is_empty());
        assert!(session.slides().is_empty());
        assert_eq!(session.created_at(), session.updated_at());
    }

    #[test]
    fn test_apply_text_recompiles() {
        let mut session = Session::new("notes");
        session.apply_text("Parent\n\tChild");
        assert_eq!(session.slides().len(), 2);
        assert_eq!(session.boundaries().len(), 2);
        assert_eq!(session.slides(), compile(session.raw_text()).slides);

        session.apply_text("");
        assert!(session.slides().is_empty());
        assert!(session.boundaries().is_empty());
    }

    #[test]
    fn test_parse_session_id() {
        let session = Session::new("x");
        let parsed = parse_session_id(&session.id().to_string()).unwrap();
        assert_eq!(parsed, session.id());
        assert!(parse_session_id("not-a-uuid").is_err());
    }

    #[test]
    fn test_session_serializes_snake_case() {
        let mut session = Session::new("x");
        session.apply_text("Hello");
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["raw_text"], "Hello");
        assert_eq!(json["slides"][0]["items"][0]["is_sub_item"], false);
        assert!(json.get("created_at").is_some());
    }
}
