//! HTTP front end for the fake player
//!
//! Serves the query, command and SSE endpoints on an ephemeral port so
//! the reqwest transport runs end to end.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use wpc_common::{
    compose, Command, Error, NewPlaylist, Notification, PlaylistRange, PlaylistRef, QueryResult,
    QuerySpec, TransportError, WireQuery,
};

use super::fake_player::FakePlayer;

/// Fake player served over HTTP on 127.0.0.1
pub struct TestServer {
    addr: SocketAddr,
    player: FakePlayer,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start serving a fresh fake player
    pub async fn start() -> Self {
        Self::start_with(FakePlayer::new()).await
    }

    pub async fn start_with(player: FakePlayer) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local address");
        let app = router(player.clone());

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            player,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn player(&self) -> &FakePlayer {
        &self.player
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(player: FakePlayer) -> Router {
    Router::new()
        .route("/api/query", get(query))
        .route("/api/query/events", get(events))
        .route("/api/query/updates", get(updates))
        .route("/api/player", post(set_options))
        .route("/api/player/play", post(play_current))
        .route("/api/player/play/:plref/:index", post(play))
        .route("/api/player/pause", post(pause))
        .route("/api/player/stop", post(stop))
        .route("/api/player/next", post(next))
        .route("/api/player/previous", post(previous))
        .route("/api/playlists/add", post(add_playlist))
        .route("/api/playlists/:plref/items/add", post(add_items))
        .with_state(player)
}

/// Query string form of a composite query
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuery {
    #[serde(default)]
    player: bool,
    #[serde(default)]
    playlists: bool,
    #[serde(default)]
    playlist_items: bool,
    trcolumns: Option<String>,
    plref: Option<String>,
    plrange: Option<String>,
    plcolumns: Option<String>,
}

impl RawQuery {
    fn into_wire(self) -> Result<WireQuery, ApiError> {
        let split = |s: String| s.split(',').map(str::to_string).collect::<Vec<_>>();
        let plrange = match self.plrange {
            Some(range) => Some(range.parse::<PlaylistRange>().map_err(ApiError::bad_request)?),
            None => None,
        };
        let spec = QuerySpec {
            player: self.player,
            playlists: self.playlists,
            playlist_items: self.playlist_items,
            trcolumns: self.trcolumns.map(split),
            plref: self.plref.map(|s| s.parse().unwrap_or(PlaylistRef::Id(s))),
            plrange,
            plcolumns: self.plcolumns.map(split),
        };
        compose(&spec).map_err(ApiError::from)
    }
}

struct ApiError {
    status: StatusCode,
    body: String,
}

impl ApiError {
    fn bad_request(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: body.into(),
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Http { status, body } => Self {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body,
            },
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: other.to_string(),
            },
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Transport(e) => e.into(),
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}

async fn query(
    State(player): State<FakePlayer>,
    Query(raw): Query<RawQuery>,
) -> Result<Json<QueryResult>, ApiError> {
    let wire = raw.into_wire()?;
    Ok(Json(player.run_query(&wire)?))
}

fn command(player: &FakePlayer, command: Command) -> Result<StatusCode, ApiError> {
    player.run_command(&command)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn play(
    State(player): State<FakePlayer>,
    Path((plref, index)): Path<(String, u32)>,
) -> Result<StatusCode, ApiError> {
    let plref = plref.parse().unwrap_or(PlaylistRef::Id(plref));
    command(&player, Command::Play { plref, index })
}

async fn play_current(State(player): State<FakePlayer>) -> Result<StatusCode, ApiError> {
    command(&player, Command::PlayCurrent)
}

async fn pause(State(player): State<FakePlayer>) -> Result<StatusCode, ApiError> {
    command(&player, Command::Pause)
}

async fn stop(State(player): State<FakePlayer>) -> Result<StatusCode, ApiError> {
    command(&player, Command::Stop)
}

async fn next(State(player): State<FakePlayer>) -> Result<StatusCode, ApiError> {
    command(&player, Command::Next)
}

async fn previous(State(player): State<FakePlayer>) -> Result<StatusCode, ApiError> {
    command(&player, Command::Previous)
}

#[derive(Deserialize)]
struct OptionsBody {
    options: Vec<OptionValue>,
}

#[derive(Deserialize)]
struct OptionValue {
    id: String,
    value: Value,
}

async fn set_options(
    State(player): State<FakePlayer>,
    Json(body): Json<OptionsBody>,
) -> Result<StatusCode, ApiError> {
    for option in body.options {
        command(
            &player,
            Command::SetOption {
                id: option.id,
                value: option.value,
            },
        )?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn add_playlist(
    State(player): State<FakePlayer>,
    Json(fields): Json<NewPlaylist>,
) -> Result<StatusCode, ApiError> {
    command(&player, Command::AddPlaylist(fields))
}

#[derive(Deserialize)]
struct ItemsBody {
    items: Vec<String>,
}

async fn add_items(
    State(player): State<FakePlayer>,
    Path(plref): Path<String>,
    Json(body): Json<ItemsBody>,
) -> Result<StatusCode, ApiError> {
    let plref = plref.parse().unwrap_or(PlaylistRef::Id(plref));
    command(
        &player,
        Command::AddPlaylistItems {
            plref,
            items: body.items,
        },
    )
}

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;
type SseStream = Sse<EventStream>;

/// SSE response; the leading comment flushes headers so the client sees
/// the subscription confirmed right away
fn sse(notifications: BoxStream<'static, Notification>) -> SseStream {
    let body = notifications.filter_map(|notification| async move {
        let data = match &notification {
            Notification::Event(domains) => serde_json::to_string(domains),
            Notification::Update(payload) => serde_json::to_string(payload),
        };
        data.ok()
            .map(|data| Ok::<_, Infallible>(Event::default().data(data)))
    });
    let first = stream::once(async { Ok::<_, Infallible>(Event::default().comment("subscribed")) });
    let stream: EventStream = Box::pin(first.chain(body));

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}

async fn events(State(player): State<FakePlayer>) -> SseStream {
    // Subscribed before the response is returned
    sse(player.event_stream())
}

async fn updates(
    State(player): State<FakePlayer>,
    Query(raw): Query<RawQuery>,
) -> Result<SseStream, ApiError> {
    let wire = raw.into_wire()?;
    Ok(sse(player.update_stream(wire)))
}
