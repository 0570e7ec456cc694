//! Domain inclusion flags
//!
//! The three independently queryable and observable state categories.
//! The same flag set drives query composition, result shape and
//! notification filtering.

use serde::{Deserialize, Serialize};

/// Set of domains (player, playlists, playlist items)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Domains {
    pub player: bool,
    pub playlists: bool,
    pub playlist_items: bool,
}

impl Domains {
    pub const NONE: Domains = Domains {
        player: false,
        playlists: false,
        playlist_items: false,
    };

    pub const PLAYER: Domains = Domains {
        player: true,
        playlists: false,
        playlist_items: false,
    };

    pub const PLAYLISTS: Domains = Domains {
        player: false,
        playlists: true,
        playlist_items: false,
    };

    pub const PLAYLIST_ITEMS: Domains = Domains {
        player: false,
        playlists: false,
        playlist_items: true,
    };

    pub const ALL: Domains = Domains {
        player: true,
        playlists: true,
        playlist_items: true,
    };

    pub fn is_empty(&self) -> bool {
        !(self.player || self.playlists || self.playlist_items)
    }

    /// True when at least one domain is flagged in both sets
    pub fn intersects(&self, other: Domains) -> bool {
        (self.player && other.player)
            || (self.playlists && other.playlists)
            || (self.playlist_items && other.playlist_items)
    }

    pub fn union(self, other: Domains) -> Domains {
        Domains {
            player: self.player || other.player,
            playlists: self.playlists || other.playlists,
            playlist_items: self.playlist_items || other.playlist_items,
        }
    }

    /// Wire names of the flagged domains, in canonical order
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(3);
        if self.player {
            names.push("player");
        }
        if self.playlists {
            names.push("playlists");
        }
        if self.playlist_items {
            names.push("playlistItems");
        }
        names
    }
}

impl std::ops::BitOr for Domains {
    type Output = Domains;

    fn bitor(self, rhs: Domains) -> Domains {
        self.union(rhs)
    }
}

impl std::fmt::Display for Domains {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", self.names().join("+"))
    }
}
