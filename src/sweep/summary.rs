use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

/// Counters of one sweep. Scoped to that sweep and never shared.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SweepSummary {
    pub sweep_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub discovered: usize,
    /// Missing, foreign, or failed to fetch
    pub unavailable: usize,
    pub eligible: usize,
    pub settled: usize,
    /// Already terminal when we tried
    pub no_op: usize,
    pub failed: usize,
    /// Held back by the failure policy
    pub deferred: usize,
    /// Not attempted because of shutdown
    pub skipped: usize,
    pub discovery_error: Option<String>,
}

impl SweepSummary {
    pub fn new(sweep_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            sweep_id,
            started_at,
            finished_at: None,
            discovered: 0,
            unavailable: 0,
            eligible: 0,
            settled: 0,
            no_op: 0,
            failed: 0,
            deferred: 0,
            skipped: 0,
            discovery_error: None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| end.signed_duration_since(self.started_at).num_milliseconds())
    }
}

/// Process-wide view of the watcher, read by the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    pub signer_address: String,
    pub started_at: DateTime<Utc>,
    pub sweeping: bool,
    pub sweeps_started: u64,
    pub sweeps_completed: u64,
    pub dropped_triggers: u64,
    pub last_summary: Option<SweepSummary>,
}

#[derive(Debug)]
pub struct StatusBoard {
    inner: RwLock<WatcherStatus>,
}

impl StatusBoard {
    pub fn new(signer_address: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(WatcherStatus {
                signer_address: signer_address.into(),
                started_at: Utc::now(),
                sweeping: false,
                sweeps_started: 0,
                sweeps_completed: 0,
                dropped_triggers: 0,
                last_summary: None,
            }),
        }
    }

    pub fn sweep_started(&self) {
        let mut status = self.inner.write();
        status.sweeping = true;
        status.sweeps_started += 1;
    }

    pub fn sweep_finished(&self, summary: SweepSummary) {
        let mut status = self.inner.write();
        status.sweeping = false;
        status.sweeps_completed += 1;
        status.last_summary = Some(summary);
    }

    pub fn trigger_dropped(&self) {
        self.inner.write().dropped_triggers += 1;
    }

    pub fn snapshot(&self) -> WatcherStatus {
        self.inner.read().clone()
    }
}
