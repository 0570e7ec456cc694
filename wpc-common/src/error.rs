//! Common error types for WPC
//!
//! One error enum is shared by the composer, the executor, the event
//! multiplexer and the state poller so callers can match on a single type.

use std::time::Duration;
use thiserror::Error;

/// Common result type for WPC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by the transport collaborator
///
/// Propagated to the caller unmodified. Nothing in WPC retries them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection-level failure (DNS, refused, reset, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Remote side answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response or push message body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Response decoded but does not have the requested shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Push channel is closed or was never opened
    #[error("Push channel closed")]
    ChannelClosed,
}

/// Common error type for all WPC operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed domain/projection combination, detected before any request
    #[error("Invalid query spec: {0}")]
    InvalidQuerySpec(String),

    /// Request/response or push channel failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Expectation deadline elapsed before a matching notification arrived
    #[error("Expectation timed out after {timeout:?}")]
    ExpectationTimeout { timeout: Duration },

    /// Expectation was cancelled by its owner
    #[error("Expectation cancelled")]
    ExpectationCancelled,

    /// State poller deadline elapsed before the predicate held
    #[error("Poll timed out after {timeout:?} ({polls} polls)")]
    PollTimeout { timeout: Duration, polls: u32 },

    /// Update payload and pull query still disagree after the staleness window
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for outcomes meaning "nothing happened in time"
    ///
    /// Lets callers tell a silent remote side apart from a broken connection.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::ExpectationTimeout { .. } | Error::PollTimeout { .. }
        )
    }

    /// True when the failure came from the transport collaborator
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}
