//! Entities replicated between application instances.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::slides::Slide;

/// One slide deck inside a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PlaylistItem {
    /// Stable identity used for last-writer-wins
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub slides: Vec<Slide>,
    /// Timestamp (ms) of the write that produced this version
    #[serde(default)]
    pub updated_at: i64,
}

/// An ordered list of playlist items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
}

impl Playlist {
    /// Empty playlist.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Position of an item by id.
    pub fn position(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == item_id)
    }

    /// Insert or replace an item, optionally moving it to `position`.
    pub fn upsert(&mut self, item: PlaylistItem, position: Option<usize>) {
        match self.position(&item.id) {
            Some(index) => match position {
                Some(target) if target != index => {
                    self.items.remove(index);
                    let target = target.min(self.items.len());
                    self.items.insert(target, item);
                }
                _ => self.items[index] = item,
            },
            None => {
                let target = position.unwrap_or(self.items.len()).min(self.items.len());
                self.items.insert(target, item);
            }
        }
    }

    /// Remove an item, returning it if present.
    pub fn remove(&mut self, item_id: &str) -> Option<PlaylistItem> {
        self.position(item_id).map(|index| self.items.remove(index))
    }
}

/// Action attached to a schedule item on one instance only.
///
/// Automations are never transmitted; see [`splice_automations`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Automation {
    pub id: String,
    /// When the automation fires, e.g. `on_start` or `on_end`
    pub trigger: String,
    /// Opaque action understood by the local application
    pub action: String,
}

/// A named time block in the run-of-show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ScheduleItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub start_time: Option<String>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(skip)]
    pub automations: Vec<Automation>,
}

/// The run-of-show schedule with its currently active item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Schedule {
    pub items: Vec<ScheduleItem>,
    #[serde(default)]
    pub active_index: Option<usize>,
}

/// Graft local automations onto a schedule received from another instance.
///
/// Items are matched by name; when several local items share a name the
/// first one's automations are used. Incoming items without a local match
/// carry no automations. Returns how many items received automations.
pub fn splice_automations(incoming: &mut [ScheduleItem], local: &[ScheduleItem]) -> usize {
    let mut by_name: HashMap<&str, &[Automation]> = HashMap::new();
    for item in local {
        by_name
            .entry(item.name.as_str())
            .or_insert(item.automations.as_slice());
    }

    let mut spliced = 0;
    for item in incoming.iter_mut() {
        item.automations = match by_name.get(item.name.as_str()) {
            Some(automations) => automations.to_vec(),
            None => Vec::new(),
        };
        if !item.automations.is_empty() {
            spliced += 1;
        }
    }
    spliced
}
