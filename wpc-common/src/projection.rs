//! Projection parameters
//!
//! Column selectors and playlist windows that narrow what a domain query
//! returns. Column format strings are opaque and reach the remote side
//! unmodified; only their presence is validated locally.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a playlist either by position or by remote id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlaylistRef {
    Index(u32),
    Id(String),
}

impl fmt::Display for PlaylistRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaylistRef::Index(index) => write!(f, "{}", index),
            PlaylistRef::Id(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for PlaylistRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<u32>() {
            Ok(index) => PlaylistRef::Index(index),
            Err(_) => PlaylistRef::Id(s.to_string()),
        })
    }
}

impl From<u32> for PlaylistRef {
    fn from(index: u32) -> Self {
        PlaylistRef::Index(index)
    }
}

impl From<&str> for PlaylistRef {
    fn from(id: &str) -> Self {
        PlaylistRef::Id(id.to_string())
    }
}

/// Half-open window `start:end` over playlist items
///
/// `end` may exceed the playlist length, meaning "to the end".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlaylistRange {
    pub start: u32,
    pub end: u32,
}

impl PlaylistRange {
    pub fn new(start: u32, end: u32) -> Result<Self, String> {
        if start > end {
            return Err(format!("range start {} exceeds end {}", start, end));
        }
        Ok(Self { start, end })
    }

    /// Window covering the first `len` items
    pub fn full(len: u32) -> Self {
        Self { start: 0, end: len }
    }

    /// Window from the first item to the end of the playlist
    ///
    /// The server clamps an end past the playlist length to the length.
    pub fn to_end() -> Self {
        Self {
            start: 0,
            end: u32::MAX,
        }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for PlaylistRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for PlaylistRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once(':')
            .ok_or_else(|| format!("range '{}' is not of the form start:end", s))?;
        let start = start
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("range start '{}': {}", start, e))?;
        let end = end
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("range end '{}': {}", end, e))?;
        PlaylistRange::new(start, end)
    }
}

impl TryFrom<String> for PlaylistRange {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PlaylistRange> for String {
    fn from(range: PlaylistRange) -> Self {
        range.to_string()
    }
}

/// Builds an owned column list from string slices
pub fn columns<I, S>(columns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    columns.into_iter().map(Into::into).collect()
}
