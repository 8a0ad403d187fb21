//! Live Slides wire protocol.
//!
//! Every frame is a JSON object tagged by `type`. Clients send
//! [`ClientMessage`]s and the hub answers or pushes [`ServerMessage`]s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LiveSlidesError, Result};
use crate::session::Session;
use crate::slides::{Slide, SlideBoundary};

/// Role a connection plays inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Editor that sends text updates
    #[default]
    Notepad,
    /// Passive display that only receives
    Viewer,
}

/// Whether a transcription chunk may still change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Interim,
    Final,
}

/// A chunk from the live transcription / analysis pipeline.
///
/// The hub forwards these without interpreting them; fields it does not know
/// about (scripture references, key points, ...) are carried in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionChunk {
    pub kind: ChunkKind,
    pub timestamp: i64,
    pub engine: String,
    pub text: String,
    /// Target session; `None` fans out to every session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Messages sent from a client to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinSession {
        session_id: String,
        #[serde(default)]
        client_type: ClientRole,
    },
    LeaveSession,
    TextUpdate {
        session_id: String,
        text: String,
    },
    CreateSession {
        name: String,
    },
    DeleteSession {
        session_id: String,
    },
    ListSessions,
    TranscriptionStream(TranscriptionChunk),
}

impl ClientMessage {
    /// Parse a text frame, distinguishing unknown message types from bad JSON.
    pub fn parse(raw: &str) -> Result<Self> {
        match serde_json::from_str(raw) {
            Ok(message) => Ok(message),
            Err(err) => {
                let kind = serde_json::from_str::<Value>(raw)
                    .ok()
                    .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string));
                match kind {
                    Some(kind) if !Self::KNOWN_TYPES.contains(&kind.as_str()) => {
                        Err(LiveSlidesError::UnsupportedMessage(kind))
                    }
                    _ => Err(LiveSlidesError::MalformedMessage(err)),
                }
            }
        }
    }

    const KNOWN_TYPES: &'static [&'static str] = &[
        "join_session",
        "leave_session",
        "text_update",
        "create_session",
        "delete_session",
        "list_sessions",
        "transcription_stream",
    ];
}

/// Messages pushed from the hub to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SlidesUpdate {
        session_id: String,
        slides: Vec<Slide>,
        boundaries: Vec<SlideBoundary>,
        raw_text: String,
    },
    SessionCreated {
        session: Session,
    },
    SessionDeleted {
        session_id: String,
    },
    SessionsList {
        sessions: Vec<Session>,
    },
    TranscriptionStream(TranscriptionChunk),
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// Snapshot of a session's compiled state.
    pub fn slides_update(session: &Session) -> Self {
        ServerMessage::SlidesUpdate {
            session_id: session.id().to_string(),
            slides: session.slides().to_vec(),
            boundaries: session.boundaries().to_vec(),
            raw_text: session.raw_text().to_string(),
        }
    }

    /// Error reply built from any displayable error.
    pub fn error(err: impl std::fmt::Display) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
