//! Query executor
//!
//! Composes a [`QuerySpec`], sends it through the transport and shapes the
//! answer to exactly the requested domains.

use std::sync::Arc;
use tracing::debug;

use wpc_common::{compose, QueryResult, QuerySpec, Result};

use crate::transport::Transport;

/// Runs composite queries against a transport
#[derive(Clone)]
pub struct QueryExecutor {
    transport: Arc<dyn Transport>,
}

impl QueryExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Execute `spec` in one round trip
    ///
    /// An invalid spec fails before anything is sent. Transport failures
    /// are returned unmodified and never retried.
    pub async fn execute(&self, spec: &QuerySpec) -> Result<QueryResult> {
        let wire = compose(spec)?;
        let requested = wire.domains();
        debug!(domains = %requested, "Executing query");

        let raw = self.transport.query(&wire).await?;
        Ok(raw.conform(requested)?)
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor").finish_non_exhaustive()
    }
}
