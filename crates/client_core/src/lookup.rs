use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use shared::domain::RankedEntry;
use tracing::debug;

use crate::{error::SyncError, gateway::FetchGateway};

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(Vec<RankedEntry>),
    /// A newer lookup started before this one finished.
    Superseded,
}

/// Exact-match rank lookup against `GET /users/rank`.
pub struct RankLookup {
    gateway: Arc<dyn FetchGateway>,
    generation: AtomicU64,
}

impl RankLookup {
    pub fn new(gateway: Arc<dyn FetchGateway>) -> Self {
        Self {
            gateway,
            generation: AtomicU64::new(0),
        }
    }

    /// Blank input fails with [`SyncError::EmptyQuery`] without a request and
    /// still supersedes any lookup in flight.
    pub async fn lookup(&self, username: &str) -> Result<LookupOutcome, SyncError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let username = username.trim();
        if username.is_empty() {
            return Err(SyncError::EmptyQuery);
        }

        let result = self.gateway.lookup_rank(username).await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(username, "dropping superseded rank lookup");
            return Ok(LookupOutcome::Superseded);
        }

        match result {
            Ok(entries) if entries.is_empty() => Err(SyncError::NotFound),
            Ok(entries) => Ok(LookupOutcome::Found(entries)),
            Err(err) => Err(err),
        }
    }
}
