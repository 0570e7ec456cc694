//! HTTP/SSE transport
//!
//! Speaks the remote player's REST API for queries and commands, and its
//! two Server-Sent Events endpoints for the push channel. The event and
//! update streams are merged into one logical subscription.
//!
//! No retries and no reconnects: failures surface to the caller as-is.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{self, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use wpc_common::{
    compose, ClientConfig, Command, Notification, NotificationKind, QueryResult,
    QuerySpec, TransportError, WireQuery,
};

use super::{NotificationStream, Transport};

const QUERY_PATH: &str = "/api/query";
const EVENTS_PATH: &str = "/api/query/events";
const UPDATES_PATH: &str = "/api/query/updates";

/// reqwest-based [`Transport`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for `base_url` (e.g. `http://127.0.0.1:8880`)
    ///
    /// `request_timeout` bounds queries and commands; the push channel is
    /// long-lived and has no overall timeout.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(config.base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(network_error)?;
        check_status(response).await
    }

    async fn open_stream(
        &self,
        path: &str,
        pairs: &[(&'static str, String)],
        kind: NotificationKind,
    ) -> Result<NotificationStream, TransportError> {
        let url = self.url(path);
        debug!(url = %url, kind = %kind, "Opening push stream");

        let response = self
            .client
            .get(&url)
            .query(pairs)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status(response).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(move |message| async move {
                match message {
                    Ok(event) if event.data.trim().is_empty() => None,
                    Ok(event) => Some(Notification::decode(kind, &event.data)),
                    Err(e) => Some(Err(TransportError::Network(format!(
                        "{} stream failed: {}",
                        kind, e
                    )))),
                }
            });

        Ok(stream.boxed())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn query(&self, query: &WireQuery) -> Result<QueryResult, TransportError> {
        let pairs = query.to_query_pairs();
        debug!(domains = %query.domains(), "GET {}", QUERY_PATH);

        let response = self
            .send(self.client.get(self.url(QUERY_PATH)).query(&pairs))
            .await?;
        let body = response.text().await.map_err(network_error)?;

        serde_json::from_str(&body)
            .map_err(|e| TransportError::Decode(format!("query response: {}", e)))
    }

    async fn command(&self, command: &Command) -> Result<(), TransportError> {
        let (path, body) = command_route(command);
        debug!(command = command.name(), "POST {}", path);

        let mut request = self.client.post(self.url(&path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.send(request).await?;
        Ok(())
    }

    async fn subscribe(&self, updates: &WireQuery) -> Result<NotificationStream, TransportError> {
        let events_query = compose(&QuerySpec {
            player: true,
            playlists: true,
            playlist_items: true,
            ..QuerySpec::default()
        })
        .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        let events = self
            .open_stream(EVENTS_PATH, &events_query.to_query_pairs(), NotificationKind::Event)
            .await?;
        let update_stream = self
            .open_stream(UPDATES_PATH, &updates.to_query_pairs(), NotificationKind::Update)
            .await?;

        info!(
            "Push channel subscribed at {} (updates for {})",
            self.base_url,
            updates.domains()
        );
        Ok(stream::select(events, update_stream).boxed())
    }
}

/// Path and JSON body for a command
pub fn command_route(command: &Command) -> (String, Option<Value>) {
    match command {
        Command::Play { plref, index } => (format!("/api/player/play/{}/{}", plref, index), None),
        Command::PlayCurrent => ("/api/player/play".to_string(), None),
        Command::Pause => ("/api/player/pause".to_string(), None),
        Command::Stop => ("/api/player/stop".to_string(), None),
        Command::Next => ("/api/player/next".to_string(), None),
        Command::Previous => ("/api/player/previous".to_string(), None),
        Command::SetOption { id, value } => (
            "/api/player".to_string(),
            Some(json!({ "options": [{ "id": id, "value": value }] })),
        ),
        Command::AddPlaylist(fields) => (
            "/api/playlists/add".to_string(),
            Some(serde_json::to_value(fields).unwrap_or_else(|_| json!({}))),
        ),
        Command::AddPlaylistItems { plref, items } => (
            format!("/api/playlists/{}/items/add", plref),
            Some(json!({ "items": items })),
        ),
    }
}

fn network_error(e: reqwest::Error) -> TransportError {
    TransportError::Network(e.to_string())
}

async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Http {
        status: status.as_u16(),
        body,
    })
}
