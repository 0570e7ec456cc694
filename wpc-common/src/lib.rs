//! # WPC Common Library
//!
//! Shared types for the web player client:
//! - Domain flags and projection parameters
//! - Query spec / result types and the query composer
//! - Push-channel notification types and filters
//! - Player commands
//! - Configuration loading
//! - Error taxonomy

pub mod commands;
pub mod config;
pub mod domains;
pub mod error;
pub mod notification;
pub mod projection;
pub mod query;
pub mod records;

pub use commands::{Command, LoopMode, NewPlaylist, PlaybackOrder};
pub use config::{ClientConfig, MatchPolicy};
pub use domains::Domains;
pub use error::{Error, Result, TransportError};
pub use notification::{Notification, NotificationFilter, NotificationKind};
pub use projection::{columns, PlaylistRange, PlaylistRef};
pub use query::{compose, QueryResult, QuerySpec, WireQuery};
pub use records::{PlaybackState, PlayerState, PlaylistItemRecord, PlaylistItems, PlaylistRecord};
