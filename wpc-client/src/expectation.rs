//! Expectation gate
//!
//! Two-phase wait on the push channel. An expectation is attached to the
//! multiplexer when it is created; [`Expectation::ready`] resolves once the
//! subscription is confirmed live, which closes the window between
//! registering interest and triggering the action that causes the change.
//! [`Expectation::done`] resolves with the first matching notification.
//!
//! States: pending → ready → done | timed-out | cancelled (or failed when
//! the channel breaks). Exactly one terminal outcome; the handle is
//! detached as soon as it is reached.

use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use wpc_common::{Error, Notification, NotificationFilter, Result, TransportError};

use crate::multiplexer::{HandleId, Multiplexer};

/// Lifecycle state of an [`Expectation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectationState {
    Pending,
    Ready,
    Done,
    TimedOut,
    Cancelled,
    /// Push channel closed or failed before a match
    Failed,
}

impl ExpectationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExpectationState::Done
                | ExpectationState::TimedOut
                | ExpectationState::Cancelled
                | ExpectationState::Failed
        )
    }
}

/// Caller-owned wait for a matching notification
pub struct Expectation {
    mux: Multiplexer,
    id: HandleId,
    filter: NotificationFilter,
    receiver: Option<oneshot::Receiver<Notification>>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
    state: ExpectationState,
    last_message: Option<Notification>,
    failure: Option<TransportError>,
}

enum Wake<T> {
    Value(T),
    TimedOut,
    Cancelled,
}

impl Expectation {
    /// Attach a new expectation to `mux`
    ///
    /// The deadline, if any, runs from this call.
    pub fn new<F>(
        mux: &Multiplexer,
        filter: NotificationFilter,
        predicate: F,
        timeout: Option<Duration>,
    ) -> Self
    where
        F: Fn(&Notification) -> bool + Send + Sync + 'static,
    {
        let attachment = mux.attach(filter, predicate);
        debug!(handle = %attachment.id, filter = %filter, ?timeout, "Expectation registered");

        Self {
            mux: mux.clone(),
            id: attachment.id,
            filter,
            receiver: Some(attachment.receiver),
            timeout,
            deadline: timeout.map(|t| Instant::now() + t),
            cancel: CancellationToken::new(),
            state: ExpectationState::Pending,
            last_message: None,
            failure: None,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn filter(&self) -> NotificationFilter {
        self.filter
    }

    pub fn state(&self) -> ExpectationState {
        self.state
    }

    /// The matching notification; present only after a successful `done`
    pub fn last_message(&self) -> Option<&Notification> {
        self.last_message.as_ref()
    }

    /// Token that cancels this expectation from another task
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel now; no effect once a terminal state was reached
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if !self.state.is_terminal() {
            self.finish(ExpectationState::Cancelled);
        }
    }

    /// Wait until the subscription carrying this expectation is live
    pub async fn ready(&mut self) -> Result<()> {
        self.observe_cancellation();
        match self.state {
            ExpectationState::Pending => {}
            ExpectationState::Ready | ExpectationState::Done => return Ok(()),
            _ => return Err(self.terminal_error()),
        }

        let mux = self.mux.clone();
        match self.guarded(mux.wait_live()).await {
            Wake::Value(Ok(())) => {
                self.state = ExpectationState::Ready;
                debug!(handle = %self.id, "Expectation ready");
                Ok(())
            }
            Wake::Value(Err(e)) => {
                self.failure = Some(e);
                self.finish(ExpectationState::Failed);
                Err(self.terminal_error())
            }
            Wake::TimedOut => {
                self.finish(ExpectationState::TimedOut);
                Err(self.terminal_error())
            }
            Wake::Cancelled => {
                self.finish(ExpectationState::Cancelled);
                Err(self.terminal_error())
            }
        }
    }

    /// Wait for the first matching notification
    ///
    /// Never resolves before [`ready`](Self::ready) would. Repeated calls
    /// return the same outcome.
    pub async fn done(&mut self) -> Result<Notification> {
        self.ready().await?;
        self.observe_cancellation();
        if self.state == ExpectationState::Done {
            if let Some(message) = &self.last_message {
                return Ok(message.clone());
            }
        }

        let Some(receiver) = self.receiver.take() else {
            return Err(self.terminal_error());
        };

        match self.guarded(receiver).await {
            Wake::Value(Ok(notification)) => {
                debug!(handle = %self.id, kind = %notification.kind(), "Expectation done");
                self.last_message = Some(notification.clone());
                self.finish(ExpectationState::Done);
                Ok(notification)
            }
            Wake::Value(Err(_)) => {
                self.failure = Some(self.mux.closed_reason());
                self.finish(ExpectationState::Failed);
                Err(self.terminal_error())
            }
            Wake::TimedOut => {
                self.finish(ExpectationState::TimedOut);
                Err(self.terminal_error())
            }
            Wake::Cancelled => {
                self.finish(ExpectationState::Cancelled);
                Err(self.terminal_error())
            }
        }
    }

    /// Race `future` against the deadline and the cancellation token
    async fn guarded<T>(&self, future: impl std::future::Future<Output = T>) -> Wake<T> {
        let deadline = self.deadline;
        let sleep = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            value = future => Wake::Value(value),
            _ = self.cancel.cancelled() => Wake::Cancelled,
            _ = sleep => Wake::TimedOut,
        }
    }

    /// Apply a cancellation requested through the token while idle
    fn observe_cancellation(&mut self) {
        if self.cancel.is_cancelled() && !self.state.is_terminal() {
            self.finish(ExpectationState::Cancelled);
        }
    }

    fn finish(&mut self, state: ExpectationState) {
        self.state = state;
        self.receiver = None;
        self.mux.detach(self.id);
        if state != ExpectationState::Done {
            debug!(handle = %self.id, ?state, "Expectation ended without match");
        }
    }

    fn terminal_error(&self) -> Error {
        match self.state {
            ExpectationState::TimedOut => Error::ExpectationTimeout {
                timeout: self.timeout.unwrap_or_default(),
            },
            ExpectationState::Cancelled => Error::ExpectationCancelled,
            _ => Error::Transport(
                self.failure
                    .clone()
                    .unwrap_or(TransportError::ChannelClosed),
            ),
        }
    }
}

impl Drop for Expectation {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.mux.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expectation")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .finish()
    }
}
