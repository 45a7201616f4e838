//! Forced-settlement eligibility
//!
//! `eligible = now >= deadline + grace && active && !completed`
//!
//! Pure and monotone in `now`: once a commitment is eligible it stays eligible
//! until its state turns terminal.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::ledger::models::{millis_to_datetime, CommitmentSnapshot};

/// Instant at which the grace window closes (saturating)
pub fn grace_boundary_ms(snapshot: &CommitmentSnapshot, grace_period: Duration) -> u64 {
    let grace_ms = u64::try_from(grace_period.as_millis()).unwrap_or(u64::MAX);
    snapshot.deadline_ms.saturating_add(grace_ms)
}

pub fn grace_boundary(snapshot: &CommitmentSnapshot, grace_period: Duration) -> DateTime<Utc> {
    millis_to_datetime(grace_boundary_ms(snapshot, grace_period))
}

pub fn is_eligible(snapshot: &CommitmentSnapshot, now: DateTime<Utc>, grace_period: Duration) -> bool {
    // pre-epoch clocks are never past a deadline
    let Ok(now_ms) = u64::try_from(now.timestamp_millis()) else {
        return false;
    };

    snapshot.is_open() && now_ms >= grace_boundary_ms(snapshot, grace_period)
}
