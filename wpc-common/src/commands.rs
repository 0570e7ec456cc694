//! Mutating commands sent to the remote player
//!
//! A command resolves once the remote side accepts it. Acceptance says
//! nothing about when the resulting notification is delivered.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domains::Domains;
use crate::projection::PlaylistRef;

/// Optional fields for a new playlist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlaylist {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Insert position; appended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

impl NewPlaylist {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            index: None,
        }
    }
}

/// Playback order option values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackOrder {
    Linear,
    ShuffleAlbums,
    ShuffleTracks,
    Random,
}

impl PlaybackOrder {
    pub const OPTION_ID: &'static str = "playbackOrder";

    pub fn option_value(self) -> u32 {
        match self {
            PlaybackOrder::Linear => 0,
            PlaybackOrder::ShuffleAlbums => 1,
            PlaybackOrder::ShuffleTracks => 2,
            PlaybackOrder::Random => 3,
        }
    }
}

/// Loop mode option values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoopMode {
    None,
    All,
    Single,
}

impl LoopMode {
    pub const OPTION_ID: &'static str = "loopMode";

    pub fn option_value(self) -> u32 {
        match self {
            LoopMode::None => 0,
            LoopMode::All => 1,
            LoopMode::Single => 2,
        }
    }
}

/// Command understood by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    /// Start playing item `index` of playlist `plref`
    Play { plref: PlaylistRef, index: u32 },
    /// Resume or start the current item
    PlayCurrent,
    Pause,
    Stop,
    Next,
    Previous,
    /// Set a player option by id
    SetOption { id: String, value: Value },
    AddPlaylist(NewPlaylist),
    /// Append items (paths or URLs) to a playlist
    AddPlaylistItems { plref: PlaylistRef, items: Vec<String> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Play { .. } => "play",
            Command::PlayCurrent => "play_current",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::Next => "next",
            Command::Previous => "previous",
            Command::SetOption { .. } => "set_option",
            Command::AddPlaylist(_) => "add_playlist",
            Command::AddPlaylistItems { .. } => "add_playlist_items",
        }
    }

    /// Domains this command is expected to change on the remote side
    pub fn affected_domains(&self) -> Domains {
        match self {
            Command::Play { .. }
            | Command::PlayCurrent
            | Command::Pause
            | Command::Stop
            | Command::Next
            | Command::Previous
            | Command::SetOption { .. } => Domains::PLAYER,
            Command::AddPlaylist(_) => Domains::PLAYLISTS,
            Command::AddPlaylistItems { .. } => Domains::PLAYLISTS | Domains::PLAYLIST_ITEMS,
        }
    }

    pub fn playback_order(order: PlaybackOrder) -> Self {
        Command::SetOption {
            id: PlaybackOrder::OPTION_ID.to_string(),
            value: Value::from(order.option_value()),
        }
    }

    pub fn loop_mode(mode: LoopMode) -> Self {
        Command::SetOption {
            id: LoopMode::OPTION_ID.to_string(),
            value: Value::from(mode.option_value()),
        }
    }
}
