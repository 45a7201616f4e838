// Repeated-failure policy
//
// A settlement that keeps failing (e.g. gas budget too low for the object)
// would otherwise burn a submission every sweep forever. Operators pick one of:
// - retry:      reconsider every sweep
// - backoff:    after n consecutive failures skip the next min(2^(n-1), max) sweeps
// - quarantine: after N consecutive failures stop attempting until restart

use std::collections::HashMap;
use tracing::error;

use crate::ledger::models::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Retry,
    Backoff { max_skip_sweeps: u32 },
    Quarantine { after: u32 },
}

impl FailurePolicy {
    pub fn parse(name: &str, quarantine_after: u32, backoff_max_sweeps: u32) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "retry" => Some(FailurePolicy::Retry),
            "backoff" => Some(FailurePolicy::Backoff {
                max_skip_sweeps: backoff_max_sweeps.max(1),
            }),
            "quarantine" => Some(FailurePolicy::Quarantine {
                after: quarantine_after.max(1),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Attempt,
    /// Skipped this sweep under backoff
    Deferred { remaining_sweeps: u32 },
    Quarantined { failures: u32 },
}

#[derive(Debug, Clone, Default)]
struct FailureRecord {
    consecutive: u32,
    skip_remaining: u32,
}

/// Consecutive settlement failures per commitment, kept across sweeps
#[derive(Debug)]
pub struct FailureTracker {
    policy: FailurePolicy,
    records: HashMap<ObjectId, FailureRecord>,
}

impl FailureTracker {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            records: HashMap::new(),
        }
    }

    /// Decide whether an eligible commitment gets a submission this sweep.
    /// Consumes one deferred sweep under backoff.
    pub fn admit(&mut self, id: &ObjectId) -> Admission {
        let Some(record) = self.records.get_mut(id) else {
            return Admission::Attempt;
        };

        match self.policy {
            FailurePolicy::Retry => Admission::Attempt,
            FailurePolicy::Backoff { .. } => {
                if record.skip_remaining > 0 {
                    record.skip_remaining -= 1;
                    Admission::Deferred {
                        remaining_sweeps: record.skip_remaining,
                    }
                } else {
                    Admission::Attempt
                }
            }
            FailurePolicy::Quarantine { after } => {
                if record.consecutive >= after {
                    Admission::Quarantined {
                        failures: record.consecutive,
                    }
                } else {
                    Admission::Attempt
                }
            }
        }
    }

    pub fn record_failure(&mut self, id: &ObjectId) {
        let record = self.records.entry(id.clone()).or_default();
        record.consecutive = record.consecutive.saturating_add(1);

        match self.policy {
            FailurePolicy::Retry => {}
            FailurePolicy::Backoff { max_skip_sweeps } => {
                let exp = record.consecutive.saturating_sub(1).min(31);
                record.skip_remaining = (1u32 << exp).min(max_skip_sweeps);
            }
            FailurePolicy::Quarantine { after } => {
                if record.consecutive == after {
                    error!(
                        "🚨 Quarantining {} after {} consecutive settlement failures; operator attention needed",
                        id, record.consecutive
                    );
                }
            }
        }
    }

    /// Any non-failure outcome resets the streak
    pub fn clear(&mut self, id: &ObjectId) {
        self.records.remove(id);
    }

    pub fn consecutive_failures(&self, id: &ObjectId) -> u32 {
        self.records.get(id).map(|r| r.consecutive).unwrap_or(0)
    }

    pub fn tracked(&self) -> usize {
        self.records.len()
    }
}
