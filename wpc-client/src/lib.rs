//! # WPC Client
//!
//! Keeps pull queries and push notifications of a remote media player in
//! sync:
//! - [`QueryExecutor`]: composite queries over player, playlists and items
//! - [`Client`]: single-domain read accessors and player commands
//! - [`Multiplexer`]: the one push-channel subscription of a session
//! - [`Expectation`]: two-phase (ready/done) waits for a notification
//! - [`Client::wait_for_state`]: level-triggered polling
//! - [`Client::confirm_update`]: update vs. query cross-check

pub mod client;
pub mod consistency;
pub mod executor;
pub mod expectation;
pub mod multiplexer;
pub mod poller;
pub mod transport;

pub use client::Client;
pub use executor::QueryExecutor;
pub use expectation::{Expectation, ExpectationState};
pub use multiplexer::{ChannelState, HandleId, Multiplexer, NotificationWatch};
pub use poller::PollOptions;
pub use transport::{HttpTransport, NotificationStream, Transport};

pub use wpc_common as common;
