//! In-process fake of the remote player
//!
//! Keeps player state, playlists and items in memory, applies commands and
//! broadcasts one change per mutation (EventBus style). Every subscriber
//! turns a change into an event notification followed by an update
//! notification projected with its own update query.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use wpc_client::transport::{NotificationStream, Transport};
use wpc_common::{
    Command, Domains, LoopMode, Notification, PlaybackOrder, PlaybackState, PlayerState,
    PlaylistItemRecord, PlaylistItems, PlaylistRange, PlaylistRecord, PlaylistRef, QueryResult,
    TransportError, WireQuery,
};

/// Items returned when a query names no window
pub const DEFAULT_WINDOW: u32 = 100;

/// Playback position gained per player query while playing
pub const POSITION_STEP: f64 = 0.5;

const DEFAULT_TRACK_COLUMNS: &[&str] = &[];
const DEFAULT_ITEM_COLUMNS: &[&str] = &["%title%"];

#[derive(Debug, Clone)]
struct FakePlaylist {
    id: String,
    title: String,
    items: Vec<String>,
}

#[derive(Debug, Clone)]
struct ActiveItem {
    playlist_id: String,
    index: usize,
}

/// Remote player state
#[derive(Debug, Clone)]
struct Model {
    playback_state: PlaybackState,
    active: Option<ActiveItem>,
    position: f64,
    playback_order: u64,
    loop_mode: u64,
    playlists: Vec<FakePlaylist>,
    next_playlist_id: u32,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            playback_state: PlaybackState::Stopped,
            active: None,
            position: 0.0,
            playback_order: PlaybackOrder::Linear.option_value() as u64,
            loop_mode: LoopMode::All.option_value() as u64,
            playlists: vec![FakePlaylist {
                id: "p1".to_string(),
                title: "Default".to_string(),
                items: Vec::new(),
            }],
            next_playlist_id: 2,
        }
    }
}

#[derive(Debug, Clone)]
enum Change {
    Changed { domains: Domains, snapshot: Arc<Model> },
    Closed,
}

struct Inner {
    model: Mutex<Model>,
    changes: broadcast::Sender<Change>,
    queries: AtomicUsize,
    commands: AtomicUsize,
    query_failure: Mutex<Option<TransportError>>,
    subscribe_failure: Mutex<Option<TransportError>>,
    transition_delay: Mutex<Option<Duration>>,
    subscribe_delay: Mutex<Option<Duration>>,
    query_delay: Mutex<Option<Duration>>,
}

/// Shared handle to one fake player
#[derive(Clone)]
pub struct FakePlayer {
    inner: Arc<Inner>,
}

impl FakePlayer {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                model: Mutex::new(Model::default()),
                changes,
                queries: AtomicUsize::new(0),
                commands: AtomicUsize::new(0),
                query_failure: Mutex::new(None),
                subscribe_failure: Mutex::new(None),
                transition_delay: Mutex::new(None),
                subscribe_delay: Mutex::new(None),
                query_delay: Mutex::new(None),
            }),
        }
    }

    /// Apply accepted commands only after `delay`
    pub fn set_transition_delay(&self, delay: Duration) {
        *self.inner.transition_delay.lock().unwrap() = Some(delay);
    }

    /// Hold back subscription confirmation for `delay`
    pub fn set_subscribe_delay(&self, delay: Duration) {
        *self.inner.subscribe_delay.lock().unwrap() = Some(delay);
    }

    /// Answer every query only after `delay`
    pub fn set_query_delay(&self, delay: Duration) {
        *self.inner.query_delay.lock().unwrap() = Some(delay);
    }

    /// Fail the next query with `error`
    pub fn fail_next_query(&self, error: TransportError) {
        *self.inner.query_failure.lock().unwrap() = Some(error);
    }

    /// Fail the next subscription with `error`
    pub fn fail_next_subscribe(&self, error: TransportError) {
        *self.inner.subscribe_failure.lock().unwrap() = Some(error);
    }

    /// End every open push stream
    pub fn close_push_channels(&self) {
        let _ = self.inner.changes.send(Change::Closed);
    }

    /// Announce a change on `domains` without mutating anything
    pub fn touch(&self, domains: Domains) {
        let snapshot = Arc::new(self.inner.model.lock().unwrap().clone());
        let _ = self
            .inner
            .changes
            .send(Change::Changed { domains, snapshot });
    }

    pub fn query_count(&self) -> usize {
        self.inner.queries.load(Ordering::SeqCst)
    }

    pub fn command_count(&self) -> usize {
        self.inner.commands.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.changes.receiver_count()
    }

    /// Append items without going through a command
    pub fn seed_items(&self, plref: impl Into<PlaylistRef>, items: &[&str]) {
        let plref = plref.into();
        let mut model = self.inner.model.lock().unwrap();
        let index = find_playlist(&model, &plref).expect("seeded playlist exists");
        model.playlists[index]
            .items
            .extend(items.iter().map(|s| s.to_string()));
    }

    /// Push stream of events only
    pub fn event_stream(&self) -> BoxStream<'static, Notification> {
        notification_stream(self.inner.changes.subscribe(), true, None)
    }

    /// Push stream of updates only, projected by `updates`
    pub fn update_stream(&self, updates: WireQuery) -> BoxStream<'static, Notification> {
        notification_stream(self.inner.changes.subscribe(), false, Some(updates))
    }

    /// Run a query the way the remote side would
    pub fn run_query(&self, query: &WireQuery) -> Result<QueryResult, TransportError> {
        self.inner.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.inner.query_failure.lock().unwrap().take() {
            return Err(error);
        }

        let mut model = self.inner.model.lock().unwrap();
        if query.domains().player && model.playback_state == PlaybackState::Playing {
            model.position += POSITION_STEP;
        }
        project(&model, query, query.domains(), true)
    }

    /// Validate and apply (or schedule) a command
    pub fn run_command(&self, command: &Command) -> Result<(), TransportError> {
        self.inner.commands.fetch_add(1, Ordering::SeqCst);
        validate(&self.inner.model.lock().unwrap(), command)?;

        let delay = *self.inner.transition_delay.lock().unwrap();
        match delay {
            Some(delay) => {
                let player = self.clone();
                let command = command.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    player.apply(&command);
                });
            }
            None => self.apply(command),
        }
        Ok(())
    }

    fn apply(&self, command: &Command) {
        let (domains, snapshot) = {
            let mut model = self.inner.model.lock().unwrap();
            let domains = apply_command(&mut model, command);
            (domains, Arc::new(model.clone()))
        };
        if !domains.is_empty() {
            let _ = self
                .inner
                .changes
                .send(Change::Changed { domains, snapshot });
        }
    }
}

#[async_trait]
impl Transport for FakePlayer {
    async fn query(&self, query: &WireQuery) -> Result<QueryResult, TransportError> {
        let delay = *self.inner.query_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.run_query(query)
    }

    async fn command(&self, command: &Command) -> Result<(), TransportError> {
        self.run_command(command)
    }

    async fn subscribe(&self, updates: &WireQuery) -> Result<NotificationStream, TransportError> {
        if let Some(error) = self.inner.subscribe_failure.lock().unwrap().take() {
            return Err(error);
        }
        let delay = *self.inner.subscribe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // Receiver exists before this returns: nothing after confirmation is missed
        let rx = self.inner.changes.subscribe();
        Ok(notification_stream(rx, true, Some(updates.clone()))
            .map(Ok)
            .boxed())
    }
}

fn notification_stream(
    mut rx: broadcast::Receiver<Change>,
    events: bool,
    updates: Option<WireQuery>,
) -> BoxStream<'static, Notification> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(Change::Changed { domains, snapshot }) => {
                    if events {
                        yield Notification::Event(domains);
                    }
                    if let Some(updates) = &updates {
                        let wanted = Domains {
                            player: domains.player && updates.domains().player,
                            playlists: domains.playlists && updates.domains().playlists,
                            playlist_items: domains.playlist_items
                                && updates.domains().playlist_items,
                        };
                        if wanted.is_empty() {
                            continue;
                        }
                        if let Ok(payload) = project(&snapshot, updates, wanted, false) {
                            if !payload.domains().is_empty() {
                                yield Notification::Update(payload);
                            }
                        }
                    }
                }
                Ok(Change::Closed) | Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    }
    .boxed()
}

fn find_playlist(model: &Model, plref: &PlaylistRef) -> Option<usize> {
    match plref {
        PlaylistRef::Index(index) => {
            let index = *index as usize;
            (index < model.playlists.len()).then_some(index)
        }
        PlaylistRef::Id(id) => model.playlists.iter().position(|p| &p.id == id),
    }
}

fn not_found(plref: &PlaylistRef) -> TransportError {
    TransportError::Http {
        status: 404,
        body: format!("playlist not found: {}", plref),
    }
}

fn bad_request(message: impl Into<String>) -> TransportError {
    TransportError::Http {
        status: 400,
        body: message.into(),
    }
}

/// Value of one column selector for an item path like `dir/Artist - Title.flac`
pub fn column_value(path: &str, selector: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file);
    let (artist, title) = stem.split_once(" - ").unwrap_or(("", stem));
    match selector {
        "%title%" => title.to_string(),
        "%artist%" => artist.to_string(),
        "%path%" => path.to_string(),
        "%filename%" => stem.to_string(),
        _ => String::new(),
    }
}

fn columns_of(path: &str, selectors: &[String]) -> Value {
    Value::from(
        selectors
            .iter()
            .map(|s| column_value(path, s))
            .collect::<Vec<_>>(),
    )
}

fn selectors(requested: Option<&[String]>, default: &[&str]) -> Vec<String> {
    requested
        .map(<[String]>::to_vec)
        .unwrap_or_else(|| default.iter().map(|s| s.to_string()).collect())
}

/// Project `model` onto `query`, restricted to `domains`
///
/// `strict` queries fail on an unknown playlist; update projections skip it.
fn project(
    model: &Model,
    query: &WireQuery,
    domains: Domains,
    strict: bool,
) -> Result<QueryResult, TransportError> {
    let mut result = QueryResult::default();

    if domains.player {
        let trcolumns = selectors(query.trcolumns(), DEFAULT_TRACK_COLUMNS);
        let active = model.active.as_ref().and_then(|active| {
            let index = model
                .playlists
                .iter()
                .position(|p| p.id == active.playlist_id)?;
            let path = model.playlists[index].items.get(active.index)?;
            Some(json!({
                "playlistId": active.playlist_id,
                "playlistIndex": index,
                "index": active.index,
                "position": model.position,
                "duration": 180.0,
                "columns": columns_of(path, &trcolumns),
            }))
        });
        let active = active.unwrap_or_else(|| {
            json!({
                "playlistId": "",
                "playlistIndex": -1,
                "index": -1,
                "position": 0.0,
                "duration": 0.0,
                "columns": [],
            })
        });

        result.player = Some(PlayerState(json!({
            "playbackState": model.playback_state.to_string(),
            "activeItem": active,
            "options": [
                {"id": PlaybackOrder::OPTION_ID, "value": model.playback_order},
                {"id": LoopMode::OPTION_ID, "value": model.loop_mode},
            ],
        })));
    }

    if domains.playlists {
        result.playlists = Some(
            model
                .playlists
                .iter()
                .enumerate()
                .map(|(index, p)| {
                    PlaylistRecord(json!({
                        "id": p.id,
                        "index": index,
                        "title": p.title,
                        "itemCount": p.items.len(),
                    }))
                })
                .collect(),
        );
    }

    if domains.playlist_items {
        let plref = query.plref().cloned().unwrap_or(PlaylistRef::Index(0));
        match find_playlist(model, &plref) {
            Some(index) => {
                let items = &model.playlists[index].items;
                let range = query
                    .plrange()
                    .unwrap_or_else(|| PlaylistRange::full(DEFAULT_WINDOW));
                let plcolumns = selectors(query.plcolumns(), DEFAULT_ITEM_COLUMNS);
                let start = (range.start as usize).min(items.len());
                let end = (range.end as usize).min(items.len());

                result.playlist_items = Some(PlaylistItems {
                    offset: start as u32,
                    total_count: Some(items.len() as u32),
                    items: items[start..end]
                        .iter()
                        .map(|path| PlaylistItemRecord(json!({ "columns": columns_of(path, &plcolumns) })))
                        .collect(),
                });
            }
            None if strict => return Err(not_found(&plref)),
            None => {}
        }
    }

    Ok(result)
}

fn validate(model: &Model, command: &Command) -> Result<(), TransportError> {
    match command {
        Command::Play { plref, index } => {
            let playlist = find_playlist(model, plref).ok_or_else(|| not_found(plref))?;
            if *index as usize >= model.playlists[playlist].items.len() {
                return Err(bad_request(format!("item index out of range: {}", index)));
            }
        }
        Command::SetOption { id, value } => {
            if id != PlaybackOrder::OPTION_ID && id != LoopMode::OPTION_ID {
                return Err(bad_request(format!("unknown option: {}", id)));
            }
            if value.as_u64().is_none() {
                return Err(bad_request(format!("invalid value for {}", id)));
            }
        }
        Command::AddPlaylistItems { plref, .. } => {
            find_playlist(model, plref).ok_or_else(|| not_found(plref))?;
        }
        _ => {}
    }
    Ok(())
}

/// Apply a validated command; returns the domains that changed
fn apply_command(model: &mut Model, command: &Command) -> Domains {
    match command {
        Command::Play { plref, index } => {
            let Some(playlist) = find_playlist(model, plref) else {
                return Domains::NONE;
            };
            model.active = Some(ActiveItem {
                playlist_id: model.playlists[playlist].id.clone(),
                index: *index as usize,
            });
            model.position = 0.0;
            model.playback_state = PlaybackState::Playing;
            Domains::PLAYER
        }
        Command::PlayCurrent => {
            if model.playback_state == PlaybackState::Playing {
                return Domains::NONE;
            }
            if model.active.is_none() {
                let Some(first) = model.playlists.iter().find(|p| !p.items.is_empty()) else {
                    return Domains::NONE;
                };
                model.active = Some(ActiveItem {
                    playlist_id: first.id.clone(),
                    index: 0,
                });
                model.position = 0.0;
            }
            model.playback_state = PlaybackState::Playing;
            Domains::PLAYER
        }
        Command::Pause => {
            if model.playback_state != PlaybackState::Playing {
                return Domains::NONE;
            }
            model.playback_state = PlaybackState::Paused;
            Domains::PLAYER
        }
        Command::Stop => {
            if model.playback_state == PlaybackState::Stopped {
                return Domains::NONE;
            }
            model.playback_state = PlaybackState::Stopped;
            model.position = 0.0;
            Domains::PLAYER
        }
        Command::Next | Command::Previous => {
            let Some(active) = model.active.clone() else {
                return Domains::NONE;
            };
            let len = model
                .playlists
                .iter()
                .find(|p| p.id == active.playlist_id)
                .map(|p| p.items.len())
                .unwrap_or(0);
            let next = if matches!(command, Command::Next) {
                active.index + 1
            } else {
                active.index.saturating_sub(1)
            };
            if next >= len {
                model.playback_state = PlaybackState::Stopped;
            } else {
                model.active = Some(ActiveItem {
                    index: next,
                    ..active
                });
                model.playback_state = PlaybackState::Playing;
            }
            model.position = 0.0;
            Domains::PLAYER
        }
        Command::SetOption { id, value } => {
            let value = value.as_u64().unwrap_or(0);
            if id == PlaybackOrder::OPTION_ID {
                model.playback_order = value;
            } else {
                model.loop_mode = value;
            }
            Domains::PLAYER
        }
        Command::AddPlaylist(fields) => {
            let playlist = FakePlaylist {
                id: format!("p{}", model.next_playlist_id),
                title: fields
                    .title
                    .clone()
                    .unwrap_or_else(|| "New Playlist".to_string()),
                items: Vec::new(),
            };
            model.next_playlist_id += 1;
            let at = fields
                .index
                .map(|i| (i as usize).min(model.playlists.len()))
                .unwrap_or(model.playlists.len());
            model.playlists.insert(at, playlist);
            Domains::PLAYLISTS
        }
        Command::AddPlaylistItems { plref, items } => {
            let Some(playlist) = find_playlist(model, plref) else {
                return Domains::NONE;
            };
            if items.is_empty() {
                return Domains::NONE;
            }
            model.playlists[playlist].items.extend(items.iter().cloned());
            Domains::PLAYLISTS | Domains::PLAYLIST_ITEMS
        }
    }
}
