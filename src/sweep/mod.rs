// Sweep driver - Idle/Sweeping loop tying discovery, fetch, eligibility and
// settlement together
//
// One sweep:
//   discover ids -> fetch snapshots -> filter eligible -> settle each eligible
//   id in ascending order, paced and strictly sequential -> log summary
//
// A timer fire while a sweep runs is dropped. Shutdown lets the in-flight call
// finish and skips the rest of the sweep.
pub mod summary;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::WatcherConfig;
use crate::discovery::Discovery;
use crate::eligibility::is_eligible;
use crate::fetcher::{FetchOutcome, StateFetcher, Unavailable};
use crate::scheduler::{Pacer, SingleFlight, SweepTimer, TimerFire};
use crate::settlement::{Admission, FailureTracker, SettlementExecutor, SettlementOutcome};
pub use summary::{StatusBoard, SweepSummary, WatcherStatus};

/// Source of "now" for eligibility
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct SweepDriver {
    config: Arc<WatcherConfig>,
    discovery: Discovery,
    fetcher: StateFetcher,
    executor: SettlementExecutor,
    failures: Mutex<FailureTracker>,
    flight: SingleFlight,
    status: Arc<StatusBoard>,
    clock: Arc<dyn Clock>,
    dry_run: bool,
}

impl SweepDriver {
    pub fn new(
        config: Arc<WatcherConfig>,
        discovery: Discovery,
        fetcher: StateFetcher,
        executor: SettlementExecutor,
        status: Arc<StatusBoard>,
    ) -> Self {
        Self {
            failures: Mutex::new(FailureTracker::new(config.failure_policy)),
            config,
            discovery,
            fetcher,
            executor,
            flight: SingleFlight::new(),
            status,
            clock: Arc::new(SystemClock),
            dry_run: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Evaluate and report eligible commitments without submitting
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn status(&self) -> Arc<StatusBoard> {
        self.status.clone()
    }

    /// Timer loop. Returns after shutdown once the in-flight sweep is done.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "🚀 Settlement watcher started (every {}s, grace {}s{})",
            self.config.sweep_interval.as_secs(),
            self.config.grace_period.as_secs(),
            if self.dry_run { ", dry run" } else { "" }
        );

        if self.discovery.is_incremental() {
            info!("📌 Incremental discovery from persisted cursor");
        }

        let mut timer = SweepTimer::new(self.config.sweep_interval, self.flight.clone());
        let mut in_flight: Option<JoinHandle<SweepSummary>> = None;

        loop {
            let sweep_shutdown = shutdown.clone();
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                fire = timer.next_fire() => match fire {
                    TimerFire::Run(guard) => {
                        let driver = self.clone();
                        in_flight = Some(tokio::spawn(async move {
                            let summary = driver.run_sweep(sweep_shutdown).await;
                            drop(guard);
                            summary
                        }));
                    }
                    TimerFire::Dropped => self.status.trigger_dropped(),
                },
            }
        }

        info!("🛑 Shutdown requested, no further sweeps will be scheduled");
        if let Some(handle) = in_flight {
            if !handle.is_finished() {
                info!("⏳ Waiting for in-flight sweep to finish");
            }
            if let Err(e) = handle.await {
                error!("❌ Sweep task failed: {}", e);
            }
        }
        info!("👋 Settlement watcher stopped");
    }

    /// Single sweep under the single-flight guard, for one-shot runs
    pub async fn run_once(&self, shutdown: watch::Receiver<bool>) -> Option<SweepSummary> {
        let _guard = self.flight.try_acquire()?;
        Some(self.run_sweep(shutdown).await)
    }

    pub async fn run_sweep(&self, shutdown: watch::Receiver<bool>) -> SweepSummary {
        let sweep_id = Uuid::new_v4();
        let span = info_span!("sweep", %sweep_id);
        self.sweep(sweep_id, shutdown).instrument(span).await
    }

    async fn sweep(&self, sweep_id: Uuid, mut shutdown: watch::Receiver<bool>) -> SweepSummary {
        self.status.sweep_started();
        let mut summary = SweepSummary::new(sweep_id, self.clock.now());
        info!("🔄 Starting sweep");

        let ids = match self.discovery.discover().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("❌ Discovery failed, retrying next sweep: {}", e);
                summary.discovery_error = Some(e.to_string());
                return self.finish(summary);
            }
        };
        summary.discovered = ids.len();

        let outcomes = self.fetcher.fetch_all(&ids).await;
        let now = self.clock.now();
        let mut eligible = Vec::new();
        let mut terminal = Vec::new();

        // BTreeMap iteration keeps eligible ids ascending
        for (id, outcome) in &outcomes {
            match outcome {
                FetchOutcome::Available(snapshot) => {
                    if is_eligible(snapshot, now, self.config.grace_period) {
                        eligible.push(id.clone());
                    } else if snapshot.is_terminal() {
                        terminal.push(id.clone());
                    }
                }
                FetchOutcome::Unavailable(reason) => {
                    summary.unavailable += 1;
                    if matches!(reason, Unavailable::NotFound) {
                        terminal.push(id.clone());
                    }
                }
            }
        }
        summary.eligible = eligible.len();

        if eligible.is_empty() {
            info!("No commitments past their grace period");
        } else {
            info!("⏰ Found {} commitments past their grace period", eligible.len());
        }

        let mut pacer = Pacer::new(self.config.submission_pacing);

        for (position, id) in eligible.iter().enumerate() {
            if *shutdown.borrow() {
                summary.skipped = eligible.len() - position;
                warn!("🛑 Shutdown during sweep, skipping {} remaining commitments", summary.skipped);
                break;
            }

            let admission = self.failures.lock().admit(id);
            match admission {
                Admission::Attempt => {}
                Admission::Deferred { remaining_sweeps } => {
                    info!("⏸️  Backing off {} ({} more sweeps)", id, remaining_sweeps);
                    summary.deferred += 1;
                    continue;
                }
                Admission::Quarantined { failures } => {
                    warn!("🚫 {} quarantined after {} failures, not attempting", id, failures);
                    summary.deferred += 1;
                    continue;
                }
            }

            if self.dry_run {
                info!("📝 Dry run: would settle {}", id);
                continue;
            }

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    summary.skipped = eligible.len() - position;
                    warn!("🛑 Shutdown during sweep, skipping {} remaining commitments", summary.skipped);
                    break;
                }
                _ = pacer.ready() => {}
            }

            match pacer.run(self.executor.settle(id)).await {
                SettlementOutcome::Settled { .. } => {
                    summary.settled += 1;
                    self.failures.lock().clear(id);
                    terminal.push(id.clone());
                }
                SettlementOutcome::AlreadySettled { .. } => {
                    summary.no_op += 1;
                    self.failures.lock().clear(id);
                    terminal.push(id.clone());
                }
                SettlementOutcome::Failed(_) => {
                    summary.failed += 1;
                    let streak = {
                        let mut failures = self.failures.lock();
                        failures.record_failure(id);
                        failures.consecutive_failures(id)
                    };
                    if streak > 1 {
                        warn!("⚠️  {} has failed {} sweeps in a row", id, streak);
                    }
                }
            }
        }

        {
            let mut failures = self.failures.lock();
            for id in &terminal {
                failures.clear(id);
            }
        }

        if let Err(e) = self.discovery.forget(&terminal).await {
            warn!("⚠️  Failed to prune terminal commitments from cursor state: {}", e);
        }

        self.finish(summary)
    }

    fn finish(&self, mut summary: SweepSummary) -> SweepSummary {
        summary.finished_at = Some(self.clock.now());

        info!(
            discovered = summary.discovered,
            unavailable = summary.unavailable,
            eligible = summary.eligible,
            settled = summary.settled,
            no_op = summary.no_op,
            failed = summary.failed,
            deferred = summary.deferred,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms().unwrap_or_default(),
            failing_tracked = self.failures.lock().tracked(),
            "✓ Sweep completed: {} settled, {} already terminal, {} failed",
            summary.settled,
            summary.no_op,
            summary.failed
        );

        self.status.sweep_finished(summary.clone());
        summary
    }
}

/// Resolves once shutdown is signalled. Never resolves if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
