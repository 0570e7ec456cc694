//! Projected domain records
//!
//! Records are immutable JSON values whose field set is decided by the
//! column selectors of the request. Equality is structural over the whole
//! value; the accessors below only read well-known fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Playback state reported by the remote player
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for PlaybackState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "playing" => Ok(PlaybackState::Playing),
            "paused" => Ok(PlaybackState::Paused),
            "stopped" => Ok(PlaybackState::Stopped),
            other => Err(format!("unknown playback state '{}'", other)),
        }
    }
}

/// Player state record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerState(pub Value);

impl PlayerState {
    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.0
            .get("playbackState")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    /// Currently active item (playlist, index, position, projected columns)
    pub fn active_item(&self) -> Option<&Value> {
        self.0.get("activeItem")
    }

    /// Projected track columns of the active item
    pub fn active_columns(&self) -> Vec<&str> {
        self.active_item()
            .and_then(|item| item.get("columns"))
            .map(string_array)
            .unwrap_or_default()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Playlist record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistRecord(pub Value);

impl PlaylistRecord {
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn index(&self) -> Option<u32> {
        self.0
            .get("index")
            .and_then(Value::as_u64)
            .and_then(|i| u32::try_from(i).ok())
    }

    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(Value::as_str)
    }

    pub fn item_count(&self) -> Option<u32> {
        self.0
            .get("itemCount")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Playlist item record, shaped by the requested column list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistItemRecord(pub Value);

impl PlaylistItemRecord {
    pub fn columns(&self) -> Vec<&str> {
        self.0.get("columns").map(string_array).unwrap_or_default()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Ordered window of playlist items
///
/// Accepts both the bare sequence form and the `{offset, totalCount, items}`
/// windowed form on input; always serializes the windowed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlaylistItemsWire", rename_all = "camelCase")]
pub struct PlaylistItems {
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u32>,
    pub items: Vec<PlaylistItemRecord>,
}

impl PlaylistItems {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlaylistItemRecord> {
        self.items.iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlaylistItemsWire {
    Sequence(Vec<PlaylistItemRecord>),
    Window {
        #[serde(default)]
        offset: u32,
        #[serde(rename = "totalCount", default)]
        total_count: Option<u32>,
        items: Vec<PlaylistItemRecord>,
    },
}

impl From<PlaylistItemsWire> for PlaylistItems {
    fn from(wire: PlaylistItemsWire) -> Self {
        match wire {
            PlaylistItemsWire::Sequence(items) => PlaylistItems {
                offset: 0,
                total_count: None,
                items,
            },
            PlaylistItemsWire::Window {
                offset,
                total_count,
                items,
            } => PlaylistItems {
                offset,
                total_count,
                items,
            },
        }
    }
}

fn string_array(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .map(|values| values.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
