//! Network sync wire messages.

use serde::{Deserialize, Serialize};

use super::entities::{Playlist, PlaylistItem, Schedule};
use super::mode::SyncMode;
use crate::error::Result;

/// Whether a playlist item message creates or updates the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemAction {
    Create,
    Update,
}

/// Messages exchanged between application instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// First frame sent by the connecting side
    SyncJoin { client_id: String, mode: SyncMode },
    /// Reply of the accepting side to a join
    SyncWelcome {
        server_id: String,
        mode: SyncMode,
        connected_clients: usize,
    },
    SyncPlaylistItem {
        action: ItemAction,
        playlist_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        playlist_name: Option<String>,
        item: PlaylistItem,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
        timestamp: i64,
    },
    SyncPlaylistDelete {
        playlist_id: String,
        item_id: String,
        timestamp: i64,
    },
    /// Whole-schedule snapshot; automations are never part of it
    SyncSchedule { schedule: Schedule, timestamp: i64 },
    /// Pull of the full state, used to resynchronize after a gap
    SyncRequestState,
    SyncFullState {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        playlists: Option<Vec<Playlist>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schedule: Option<Schedule>,
        timestamp: i64,
    },
    SyncAck {
        message_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_id: Option<String>,
    },
    SyncError { message: String },
}

impl SyncMessage {
    /// Parse a text frame.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The `type` tag of this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            SyncMessage::SyncJoin { .. } => "sync_join",
            SyncMessage::SyncWelcome { .. } => "sync_welcome",
            SyncMessage::SyncPlaylistItem { .. } => "sync_playlist_item",
            SyncMessage::SyncPlaylistDelete { .. } => "sync_playlist_delete",
            SyncMessage::SyncSchedule { .. } => "sync_schedule",
            SyncMessage::SyncRequestState => "sync_request_state",
            SyncMessage::SyncFullState { .. } => "sync_full_state",
            SyncMessage::SyncAck { .. } => "sync_ack",
            SyncMessage::SyncError { .. } => "sync_error",
        }
    }

    /// Whether this message changes replicated state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            SyncMessage::SyncPlaylistItem { .. }
                | SyncMessage::SyncPlaylistDelete { .. }
                | SyncMessage::SyncSchedule { .. }
                | SyncMessage::SyncFullState { .. }
        )
    }

    /// Id of the entity a mutation targets.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            SyncMessage::SyncPlaylistItem { item, .. } => Some(&item.id),
            SyncMessage::SyncPlaylistDelete { item_id, .. } => Some(item_id),
            _ => None,
        }
    }

    /// Error reply.
    pub fn error(err: impl std::fmt::Display) -> Self {
        SyncMessage::SyncError {
            message: err.to_string(),
        }
    }

    /// Acknowledgement of this message.
    pub fn ack(&self) -> Self {
        SyncMessage::SyncAck {
            message_type: self.type_name().to_string(),
            entity_id: self.entity_id().map(str::to_string),
        }
    }
}

/// Whether `mode` may put `message` on the wire.
///
/// Handshake and control frames are always allowed; state is only published
/// by modes that send mutations.
pub fn may_send(mode: SyncMode, message: &SyncMessage) -> bool {
    if mode == SyncMode::Off {
        return false;
    }
    !message.is_mutation() || mode.sends_mutations()
}
