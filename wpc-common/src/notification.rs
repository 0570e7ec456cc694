//! Push-channel notifications
//!
//! An event only says which domains changed. An update also carries the new
//! value of every changed domain, shaped exactly like the matching
//! [`QueryResult`] field.

use serde::{Deserialize, Serialize};

use crate::domains::Domains;
use crate::error::TransportError;
use crate::query::QueryResult;
use crate::records::{PlayerState, PlaylistItems, PlaylistRecord};

/// Event or update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Event,
    Update,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Event => write!(f, "event"),
            NotificationKind::Update => write!(f, "update"),
        }
    }
}

/// Inbound push message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Notification {
    /// Domain-change notification without payload
    Event(Domains),
    /// Domain-change notification carrying the new values
    Update(QueryResult),
}

impl Notification {
    /// Decode a push message body of the given kind
    pub fn decode(kind: NotificationKind, body: &str) -> Result<Self, TransportError> {
        match kind {
            NotificationKind::Event => serde_json::from_str::<Domains>(body)
                .map(Notification::Event)
                .map_err(|e| TransportError::Decode(format!("event message: {}", e))),
            NotificationKind::Update => serde_json::from_str::<UpdateWire>(body)
                .map_err(|e| e.to_string())
                .and_then(UpdateWire::into_result)
                .map(Notification::Update)
                .map_err(|e| TransportError::Decode(format!("update message: {}", e))),
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Event(_) => NotificationKind::Event,
            Notification::Update(_) => NotificationKind::Update,
        }
    }

    /// Domains flagged as changed
    pub fn domains(&self) -> Domains {
        match self {
            Notification::Event(domains) => *domains,
            Notification::Update(payload) => payload.domains(),
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, Notification::Event(_))
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Notification::Update(_))
    }

    /// Update payload, if any
    pub fn payload(&self) -> Option<&QueryResult> {
        match self {
            Notification::Event(_) => None,
            Notification::Update(payload) => Some(payload),
        }
    }

    pub fn player(&self) -> Option<&PlayerState> {
        self.payload().and_then(|p| p.player.as_ref())
    }

    pub fn playlists(&self) -> Option<&[PlaylistRecord]> {
        self.payload().and_then(|p| p.playlists.as_deref())
    }

    pub fn playlist_items(&self) -> Option<&PlaylistItems> {
        self.payload().and_then(|p| p.playlist_items.as_ref())
    }
}

/// One domain key of an update message
///
/// A `false` flag means the domain did not change. A `true` flag must come
/// with the payload in place of the boolean.
#[derive(Deserialize)]
#[serde(untagged)]
enum UpdateField<T> {
    Flag(bool),
    Payload(T),
}

impl<T> UpdateField<T> {
    fn into_payload(self, key: &str) -> Result<Option<T>, String> {
        match self {
            UpdateField::Flag(false) => Ok(None),
            UpdateField::Flag(true) => Err(format!("'{}' flagged without payload", key)),
            UpdateField::Payload(value) => Ok(Some(value)),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateWire {
    #[serde(default)]
    player: Option<UpdateField<PlayerState>>,
    #[serde(default)]
    playlists: Option<UpdateField<Vec<PlaylistRecord>>>,
    #[serde(default)]
    playlist_items: Option<UpdateField<PlaylistItems>>,
}

impl UpdateWire {
    fn into_result(self) -> Result<QueryResult, String> {
        fn payload<T>(field: Option<UpdateField<T>>, key: &str) -> Result<Option<T>, String> {
            field.map_or(Ok(None), |f| f.into_payload(key))
        }
        Ok(QueryResult {
            player: payload(self.player, "player")?,
            playlists: payload(self.playlists, "playlists")?,
            playlist_items: payload(self.playlist_items, "playlistItems")?,
        })
    }
}

/// Decides which notifications a handle may see
///
/// A notification passes when its kind matches (or the filter accepts any
/// kind) and its changed domains intersect the filter's domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationFilter {
    pub kind: Option<NotificationKind>,
    pub domains: Domains,
}

impl NotificationFilter {
    pub fn events(domains: Domains) -> Self {
        Self {
            kind: Some(NotificationKind::Event),
            domains,
        }
    }

    pub fn updates(domains: Domains) -> Self {
        Self {
            kind: Some(NotificationKind::Update),
            domains,
        }
    }

    pub fn any(domains: Domains) -> Self {
        Self {
            kind: None,
            domains,
        }
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        if let Some(kind) = self.kind {
            if kind != notification.kind() {
                return false;
            }
        }
        self.domains.intersects(notification.domains())
    }
}

impl std::fmt::Display for NotificationFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{}s on {}", kind, self.domains),
            None => write!(f, "any on {}", self.domains),
        }
    }
}
