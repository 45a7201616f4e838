use futures::stream::{self, StreamExt};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::error::{LedgerError, WatcherError};
use crate::ledger::models::{CommitmentSnapshot, ObjectId, ObjectState};
use crate::ledger::LedgerClient;

/// Why a snapshot could not be produced this sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    NotFound,
    NotACommitment(String),
    Failed(LedgerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Available(CommitmentSnapshot),
    Unavailable(Unavailable),
}

impl FetchOutcome {
    pub fn snapshot(&self) -> Option<&CommitmentSnapshot> {
        match self {
            FetchOutcome::Available(snapshot) => Some(snapshot),
            FetchOutcome::Unavailable(_) => None,
        }
    }
}

/// Best-effort snapshot reader with bounded concurrency and a request-rate cap
pub struct StateFetcher {
    ledger: Arc<dyn LedgerClient>,
    config: Arc<WatcherConfig>,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl StateFetcher {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: Arc<WatcherConfig>) -> Self {
        let per_second = NonZeroU32::new(config.rpc_requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            ledger,
            config,
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    /// One outcome per requested id; one id's failure never affects another
    pub async fn fetch_all(&self, ids: &BTreeSet<ObjectId>) -> BTreeMap<ObjectId, FetchOutcome> {
        let outcomes: BTreeMap<ObjectId, FetchOutcome> = stream::iter(ids.iter().cloned())
            .map(|id| async move {
                let outcome = self.fetch_one(&id).await;
                (id, outcome)
            })
            .buffer_unordered(self.config.fetch_concurrency)
            .collect()
            .await;

        let available = outcomes.values().filter(|o| o.snapshot().is_some()).count();
        info!("📥 Fetched {} of {} commitment snapshots", available, outcomes.len());

        outcomes
    }

    pub async fn fetch_one(&self, id: &ObjectId) -> FetchOutcome {
        self.limiter.until_ready().await;

        let result = tokio::time::timeout(self.config.rpc_timeout, self.ledger.get_object(id))
            .await
            .unwrap_or(Err(LedgerError::Timeout {
                operation: "get_object",
                after: self.config.rpc_timeout,
            }));

        match result {
            Ok(ObjectState::Found(snapshot)) => FetchOutcome::Available(snapshot),
            Ok(ObjectState::NotFound) => {
                debug!("Commitment {} no longer exists", id);
                FetchOutcome::Unavailable(Unavailable::NotFound)
            }
            Ok(ObjectState::NotACommitment(reason)) => {
                warn!("⚠️  Object {} is not a commitment: {}", id, reason);
                FetchOutcome::Unavailable(Unavailable::NotACommitment(reason))
            }
            Err(source) => {
                let error = WatcherError::Fetch {
                    id: id.clone(),
                    source: source.clone(),
                };
                warn!("⚠️  {}", error);
                FetchOutcome::Unavailable(Unavailable::Failed(source))
            }
        }
    }
}
