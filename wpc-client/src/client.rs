//! Client facade
//!
//! Read accessors are single-domain queries through the
//! [`QueryExecutor`]; mutating accessors send one command and resolve on
//! acceptance. Pair a mutation with an [`Expectation`] (edge-triggered) or
//! [`Client::wait_for_state`] (level-triggered) to wait for its effect.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use wpc_common::{
    compose, ClientConfig, Command, Domains, LoopMode, NewPlaylist, Notification,
    NotificationFilter, PlaybackOrder, PlayerState, PlaylistItems, PlaylistRange, PlaylistRecord,
    PlaylistRef, QueryResult, QuerySpec, Result, TransportError,
};

use crate::executor::QueryExecutor;
use crate::expectation::Expectation;
use crate::multiplexer::{Multiplexer, NotificationWatch};
use crate::transport::{HttpTransport, Transport};

/// Query/event synchronization client for one remote player session
pub struct Client {
    transport: Arc<dyn Transport>,
    executor: QueryExecutor,
    events: Multiplexer,
    config: ClientConfig,
}

impl Client {
    /// Create a client without opening the push channel
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let events = Multiplexer::new(config.expectation.match_policy);
        Self {
            executor: QueryExecutor::new(Arc::clone(&transport)),
            transport,
            events,
            config,
        }
    }

    /// Create a client and open its push channel
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self> {
        let client = Self::new(transport, config);
        client.open_channel()?;
        Ok(client)
    }

    /// Create a client over the HTTP transport described by `config`
    pub fn connect_http(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::from_config(&config)?;
        info!("Connecting to {}", transport.base_url());
        Self::connect(Arc::new(transport), config)
    }

    /// Open the session's push channel with the configured update projection
    pub fn open_channel(&self) -> Result<()> {
        let updates = compose(&self.config.updates.query_spec(Domains::ALL))?;
        self.events.open(Arc::clone(&self.transport), updates);
        Ok(())
    }

    pub fn close_channel(&self) {
        self.events.close();
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.events
    }

    // ========================================
    // Queries
    // ========================================

    /// Composite query over any subset of domains
    pub async fn query(&self, spec: &QuerySpec) -> Result<QueryResult> {
        self.executor.execute(spec).await
    }

    /// Player state, track columns projected onto `columns`
    pub async fn get_player_state(&self, columns: Option<Vec<String>>) -> Result<PlayerState> {
        let spec = QuerySpec {
            player: true,
            trcolumns: columns,
            ..QuerySpec::default()
        };
        self.query(&spec)
            .await?
            .player
            .ok_or_else(|| missing_domain("player"))
    }

    pub async fn get_playlists(&self) -> Result<Vec<PlaylistRecord>> {
        self.query(&QuerySpec::new().playlists())
            .await?
            .playlists
            .ok_or_else(|| missing_domain("playlists"))
    }

    /// All items of a playlist
    ///
    /// One query with a window open to the end, so the result is a single
    /// consistent snapshot however long the playlist is.
    pub async fn get_playlist_items(
        &self,
        plref: impl Into<PlaylistRef>,
        columns: Option<Vec<String>>,
    ) -> Result<PlaylistItems> {
        self.get_playlist_items_in(plref, Some(PlaylistRange::to_end()), columns)
            .await
    }

    /// Items of a playlist inside `range` (server default window if `None`)
    pub async fn get_playlist_items_in(
        &self,
        plref: impl Into<PlaylistRef>,
        range: Option<PlaylistRange>,
        columns: Option<Vec<String>>,
    ) -> Result<PlaylistItems> {
        let spec = QuerySpec {
            playlist_items: true,
            plref: Some(plref.into()),
            plrange: range,
            plcolumns: columns,
            ..QuerySpec::default()
        };
        self.query(&spec)
            .await?
            .playlist_items
            .ok_or_else(|| missing_domain("playlistItems"))
    }

    // ========================================
    // Commands
    // ========================================

    async fn command(&self, command: Command) -> Result<()> {
        debug!(command = command.name(), affects = %command.affected_domains(), "Sending command");
        self.transport.command(&command).await?;
        Ok(())
    }

    /// Start playing item `index` of playlist `plref`
    pub async fn play(&self, plref: impl Into<PlaylistRef>, index: u32) -> Result<()> {
        self.command(Command::Play {
            plref: plref.into(),
            index,
        })
        .await
    }

    /// Resume (or start) the current item
    pub async fn play_current(&self) -> Result<()> {
        self.command(Command::PlayCurrent).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.command(Command::Pause).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.command(Command::Stop).await
    }

    pub async fn next(&self) -> Result<()> {
        self.command(Command::Next).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.command(Command::Previous).await
    }

    pub async fn set_playback_order(&self, order: PlaybackOrder) -> Result<()> {
        self.command(Command::playback_order(order)).await
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) -> Result<()> {
        self.command(Command::loop_mode(mode)).await
    }

    pub async fn add_playlist(&self, fields: NewPlaylist) -> Result<()> {
        self.command(Command::AddPlaylist(fields)).await
    }

    /// Append `items` (paths or URLs) to playlist `plref`
    pub async fn add_playlist_items<I, S>(&self, plref: impl Into<PlaylistRef>, items: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(Command::AddPlaylistItems {
            plref: plref.into(),
            items: items.into_iter().map(Into::into).collect(),
        })
        .await
    }

    // ========================================
    // Expectations
    // ========================================

    /// Expect a notification passing `filter` and `predicate`
    ///
    /// `timeout` falls back to the configured default.
    pub fn expect<F>(&self, filter: NotificationFilter, predicate: F, timeout: Option<Duration>) -> Expectation
    where
        F: Fn(&Notification) -> bool + Send + Sync + 'static,
    {
        let timeout = timeout.or_else(|| self.config.expectation.timeout());
        Expectation::new(&self.events, filter, predicate, timeout)
    }

    /// Expect a payload-less change event on any of `domains`
    pub fn expect_event<F>(&self, domains: Domains, predicate: F) -> Expectation
    where
        F: Fn(&Notification) -> bool + Send + Sync + 'static,
    {
        self.expect(NotificationFilter::events(domains), predicate, None)
    }

    /// Expect an update carrying new values for any of `domains`
    pub fn expect_update<F>(&self, domains: Domains, predicate: F) -> Expectation
    where
        F: Fn(&Notification) -> bool + Send + Sync + 'static,
    {
        self.expect(NotificationFilter::updates(domains), predicate, None)
    }

    /// Stream every notification passing `filter`
    pub fn watch(&self, filter: NotificationFilter) -> NotificationWatch {
        self.events.watch(filter)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.events.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.config.base_url)
            .field("events", &self.events)
            .finish()
    }
}

fn missing_domain(name: &str) -> wpc_common::Error {
    TransportError::InvalidResponse(format!("response is missing {}", name)).into()
}
