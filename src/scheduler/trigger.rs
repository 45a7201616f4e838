// Sweep trigger - fixed-interval timer with a single-flight guard
//
// The timer fires once immediately and then every `interval`. A fire while a
// sweep still holds the guard is dropped, never queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::warn;

/// At most one holder at a time
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

/// Released on drop, including when the sweep task panics or is aborted
#[derive(Debug)]
pub struct FlightGuard {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Outcome of one timer fire
#[derive(Debug)]
pub enum TimerFire {
    /// Idle: caller now owns the sweep
    Run(FlightGuard),
    /// A sweep is still running; this fire is dropped
    Dropped,
}

pub struct SweepTimer {
    interval: Interval,
    flight: SingleFlight,
    dropped: AtomicU64,
}

impl SweepTimer {
    pub fn new(period: Duration, flight: SingleFlight) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            interval,
            flight,
            dropped: AtomicU64::new(0),
        }
    }

    /// Wait for the next fire; the first resolves immediately
    pub async fn next_fire(&mut self) -> TimerFire {
        self.interval.tick().await;

        match self.flight.try_acquire() {
            Some(guard) => TimerFire::Run(guard),
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("⏳ Sweep still in progress, dropping scheduled trigger");
                TimerFire::Dropped
            }
        }
    }

    pub fn dropped_fires(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
