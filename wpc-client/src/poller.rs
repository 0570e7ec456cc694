//! State poller
//!
//! Level-triggered waits: re-query the player domain at a fixed interval
//! until a predicate holds. Every poll is an independent query; nothing is
//! cached between polls.

use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use wpc_common::{Error, PlaybackState, PlayerState, Result};

use crate::client::Client;

/// Per-call overrides for [`Client::wait_for_state_with`]
#[derive(Debug, Clone, Default)]
pub struct PollOptions {
    /// Delay between polls (configured default if `None`)
    pub interval: Option<Duration>,
    /// Overall deadline (configured default if `None`)
    pub timeout: Option<Duration>,
    /// Track columns projected onto the active item
    pub columns: Option<Vec<String>>,
}

impl PollOptions {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }
}

impl Client {
    /// Poll the player state with the configured interval and timeout
    pub async fn wait_for_state<F>(&self, predicate: F) -> Result<PlayerState>
    where
        F: Fn(&PlayerState) -> bool,
    {
        self.wait_for_state_with(predicate, PollOptions::default())
            .await
    }

    /// Poll until the player reports `state`
    pub async fn wait_for_playback(&self, state: PlaybackState) -> Result<PlayerState> {
        self.wait_for_state(move |s| s.playback_state() == Some(state))
            .await
    }

    /// Poll the player state until `predicate` holds
    ///
    /// Returns the first polled state satisfying `predicate`. A query in
    /// flight when the deadline passes is awaited and its result is still
    /// checked: a late state that satisfies `predicate` is returned instead
    /// of `PollTimeout`. No further poll starts after the deadline. Query
    /// failures end the wait immediately.
    pub async fn wait_for_state_with<F>(
        &self,
        predicate: F,
        options: PollOptions,
    ) -> Result<PlayerState>
    where
        F: Fn(&PlayerState) -> bool,
    {
        let interval = options.interval.unwrap_or_else(|| self.config().poll.interval());
        let timeout = options.timeout.unwrap_or_else(|| self.config().poll.timeout());
        let deadline = Instant::now() + timeout;
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            let state = self.get_player_state(options.columns.clone()).await?;
            if predicate(&state) {
                debug!(polls, "Polled state satisfied predicate");
                return Ok(state);
            }

            let next = Instant::now() + interval;
            if next >= deadline {
                sleep_until(deadline).await;
                debug!(polls, ?timeout, "Poll deadline reached");
                return Err(Error::PollTimeout { timeout, polls });
            }
            sleep_until(next).await;
        }
    }
}
