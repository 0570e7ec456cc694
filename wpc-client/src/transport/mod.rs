//! Transport seam
//!
//! Everything that touches the network goes through [`Transport`]. The
//! client core only composes queries, interprets results and multiplexes
//! notifications; framing, connections and retry policy belong to the
//! implementation behind this trait.

pub mod http;

use async_trait::async_trait;
use futures::stream::BoxStream;

use wpc_common::{Command, Notification, QueryResult, TransportError, WireQuery};

pub use http::HttpTransport;

/// Ordered stream of push notifications from one subscription
///
/// A `Decode` error item is a single unreadable message; any other error
/// item ends the subscription.
pub type NotificationStream = BoxStream<'static, Result<Notification, TransportError>>;

/// Request/response and push-channel access to the remote player
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Run a composite query
    async fn query(&self, query: &WireQuery) -> Result<QueryResult, TransportError>;

    /// Send a mutating command; resolves once the remote side accepted it
    async fn command(&self, command: &Command) -> Result<(), TransportError>;

    /// Open the push channel
    ///
    /// Resolves only once the remote side confirmed the subscription, so
    /// every change made after this returns is observed on the stream.
    /// `updates` is the projection used for update payloads.
    async fn subscribe(&self, updates: &WireQuery) -> Result<NotificationStream, TransportError>;
}
