//! Composite queries
//!
//! A [`QuerySpec`] names any subset of the three domains plus their
//! projections. [`compose`] validates it into a [`WireQuery`], the only
//! form a transport accepts. A [`QueryResult`] carries exactly the
//! requested domains.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domains::Domains;
use crate::error::{Error, Result, TransportError};
use crate::projection::{PlaylistRange, PlaylistRef};
use crate::records::{PlayerState, PlaylistItems, PlaylistRecord};

/// Composite request over player, playlists and playlist items
///
/// Projection parameters are meaningful only when their owning flag is set:
/// `trcolumns` belongs to `player`; `plref`, `plrange` and `plcolumns`
/// belong to `playlistItems`. A flagged domain without parameters gets the
/// server-default projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    #[serde(default)]
    pub player: bool,
    #[serde(default)]
    pub playlists: bool,
    #[serde(default)]
    pub playlist_items: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trcolumns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plref: Option<PlaylistRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plrange: Option<PlaylistRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plcolumns: Option<Vec<String>>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the player domain with server-default columns
    pub fn player(mut self) -> Self {
        self.player = true;
        self
    }

    /// Request the player domain projected onto `columns`
    pub fn player_columns(mut self, columns: Vec<String>) -> Self {
        self.player = true;
        self.trcolumns = Some(columns);
        self
    }

    pub fn playlists(mut self) -> Self {
        self.playlists = true;
        self
    }

    /// Request the items of `plref`
    pub fn playlist_items(mut self, plref: impl Into<PlaylistRef>) -> Self {
        self.playlist_items = true;
        self.plref = Some(plref.into());
        self
    }

    pub fn item_range(mut self, range: PlaylistRange) -> Self {
        self.plrange = Some(range);
        self
    }

    pub fn item_columns(mut self, columns: Vec<String>) -> Self {
        self.plcolumns = Some(columns);
        self
    }

    pub fn domains(&self) -> Domains {
        Domains {
            player: self.player,
            playlists: self.playlists,
            playlist_items: self.playlist_items,
        }
    }
}

/// Validated query, ready for a transport
///
/// Only [`compose`] constructs one, so every `WireQuery` satisfies the
/// parameter presence rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireQuery {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    player: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    playlists: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    playlist_items: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    trcolumns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plref: Option<PlaylistRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plrange: Option<PlaylistRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plcolumns: Option<Vec<String>>,
}

impl WireQuery {
    pub fn domains(&self) -> Domains {
        Domains {
            player: self.player,
            playlists: self.playlists,
            playlist_items: self.playlist_items,
        }
    }

    pub fn trcolumns(&self) -> Option<&[String]> {
        self.trcolumns.as_deref()
    }

    pub fn plref(&self) -> Option<&PlaylistRef> {
        self.plref.as_ref()
    }

    pub fn plrange(&self) -> Option<PlaylistRange> {
        self.plrange
    }

    pub fn plcolumns(&self) -> Option<&[String]> {
        self.plcolumns.as_deref()
    }

    /// Flat key/value form for URL query strings
    ///
    /// Absent flags are omitted. Column lists are comma-joined.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if self.player {
            pairs.push(("player", "true".to_string()));
        }
        if self.playlists {
            pairs.push(("playlists", "true".to_string()));
        }
        if self.playlist_items {
            pairs.push(("playlistItems", "true".to_string()));
        }
        if let Some(columns) = &self.trcolumns {
            pairs.push(("trcolumns", columns.join(",")));
        }
        if let Some(plref) = &self.plref {
            pairs.push(("plref", plref.to_string()));
        }
        if let Some(range) = &self.plrange {
            pairs.push(("plrange", range.to_string()));
        }
        if let Some(columns) = &self.plcolumns {
            pairs.push(("plcolumns", columns.join(",")));
        }
        pairs
    }
}

/// Validate a [`QuerySpec`] into a [`WireQuery`]
///
/// Fails with [`Error::InvalidQuerySpec`] when a projection parameter is
/// present while its owning domain flag is not set. Pure; nothing is sent.
pub fn compose(spec: &QuerySpec) -> Result<WireQuery> {
    let mut problems = Vec::new();

    if spec.trcolumns.is_some() && !spec.player {
        problems.push("trcolumns requires player");
    }
    if spec.plref.is_some() && !spec.playlist_items {
        problems.push("plref requires playlistItems");
    }
    if spec.plrange.is_some() && !spec.playlist_items {
        problems.push("plrange requires playlistItems");
    }
    if spec.plcolumns.is_some() && !spec.playlist_items {
        problems.push("plcolumns requires playlistItems");
    }

    if !problems.is_empty() {
        return Err(Error::InvalidQuerySpec(problems.join("; ")));
    }

    Ok(WireQuery {
        player: spec.player,
        playlists: spec.playlists,
        playlist_items: spec.playlist_items,
        trcolumns: spec.trcolumns.clone(),
        plref: spec.plref.clone(),
        plrange: spec.plrange,
        plcolumns: spec.plcolumns.clone(),
    })
}

/// Composite query result
///
/// Mirrors the flags of the request: a field is present if and only if
/// its domain was requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlists: Option<Vec<PlaylistRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_items: Option<PlaylistItems>,
}

impl QueryResult {
    /// Domains present in this result
    pub fn domains(&self) -> Domains {
        Domains {
            player: self.player.is_some(),
            playlists: self.playlists.is_some(),
            playlist_items: self.playlist_items.is_some(),
        }
    }

    /// Shape a raw response to exactly the `requested` domains
    ///
    /// A missing requested domain is an invalid response. Unrequested
    /// domains are dropped.
    pub fn conform(mut self, requested: Domains) -> std::result::Result<Self, TransportError> {
        let present = self.domains();
        let missing = Domains {
            player: requested.player && !present.player,
            playlists: requested.playlists && !present.playlists,
            playlist_items: requested.playlist_items && !present.playlist_items,
        };
        if !missing.is_empty() {
            return Err(TransportError::InvalidResponse(format!(
                "response is missing requested domains: {}",
                missing
            )));
        }

        if !requested.player && self.player.take().is_some() {
            debug!("Dropping unrequested player domain from response");
        }
        if !requested.playlists && self.playlists.take().is_some() {
            debug!("Dropping unrequested playlists domain from response");
        }
        if !requested.playlist_items && self.playlist_items.take().is_some() {
            debug!("Dropping unrequested playlistItems domain from response");
        }
        Ok(self)
    }
}
