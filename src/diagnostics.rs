//! Read-only inspection of commitments and their eligibility. Never submits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

use crate::config::WatcherConfig;
use crate::discovery::Discovery;
use crate::eligibility::{grace_boundary, is_eligible};
use crate::error::WatcherResult;
use crate::fetcher::{FetchOutcome, StateFetcher, Unavailable};
use crate::ledger::models::ObjectId;

#[derive(Debug, Clone, Serialize)]
pub struct CommitmentReport {
    pub id: ObjectId,
    pub owner: String,
    pub category: String,
    pub beneficiary: String,
    pub deposit_sui: Decimal,
    pub active: bool,
    pub completed: bool,
    pub deadline: DateTime<Utc>,
    pub grace_boundary: DateTime<Utc>,
    /// Positive once the grace window has closed
    pub seconds_past_grace: i64,
    pub eligible: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnavailableReport {
    pub id: ObjectId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub generated_at: DateTime<Utc>,
    pub grace_period_secs: u64,
    pub commitments: Vec<CommitmentReport>,
    pub unavailable: Vec<UnavailableReport>,
}

impl DiagnosticReport {
    pub fn eligible(&self) -> impl Iterator<Item = &CommitmentReport> {
        self.commitments.iter().filter(|c| c.eligible)
    }
}

/// Evaluate every discovered commitment, or only `only` when given
pub async fn diagnose(
    config: &WatcherConfig,
    discovery: &Discovery,
    fetcher: &StateFetcher,
    only: Option<ObjectId>,
    now: DateTime<Utc>,
) -> WatcherResult<DiagnosticReport> {
    let ids = match only {
        Some(id) => BTreeSet::from([id]),
        None => discovery.discover().await?,
    };
    info!("🔍 Inspecting {} commitments", ids.len());

    let mut report = DiagnosticReport {
        generated_at: now,
        grace_period_secs: config.grace_period.as_secs(),
        commitments: Vec::new(),
        unavailable: Vec::new(),
    };

    for (id, outcome) in fetcher.fetch_all(&ids).await {
        match outcome {
            FetchOutcome::Available(snapshot) => {
                let boundary = grace_boundary(&snapshot, config.grace_period);
                report.commitments.push(CommitmentReport {
                    eligible: is_eligible(&snapshot, now, config.grace_period),
                    seconds_past_grace: now.signed_duration_since(boundary).num_seconds(),
                    grace_boundary: boundary,
                    deadline: snapshot.deadline(),
                    deposit_sui: snapshot.deposit_sui(),
                    id,
                    owner: snapshot.owner,
                    category: snapshot.category,
                    beneficiary: snapshot.beneficiary,
                    active: snapshot.active,
                    completed: snapshot.completed,
                });
            }
            FetchOutcome::Unavailable(reason) => {
                let reason = match reason {
                    Unavailable::NotFound => "object not found".to_string(),
                    Unavailable::NotACommitment(why) => format!("not a commitment: {}", why),
                    Unavailable::Failed(e) => e.to_string(),
                };
                report.unavailable.push(UnavailableReport { id, reason });
            }
        }
    }

    let open = report.commitments.iter().filter(|c| c.active && !c.completed).count();
    info!(
        "📊 {} commitments, {} open, {} eligible for settlement, {} unavailable",
        report.commitments.len(),
        open,
        report.eligible().count(),
        report.unavailable.len()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::{snapshot, MockLedger};
    use crate::ledger::models::millis_to_datetime;
    use std::sync::Arc;

    const NOW_MS: u64 = 1_700_000_000_000;

    fn setup() -> (Arc<MockLedger>, Arc<WatcherConfig>, Discovery, StateFetcher) {
        let ledger = Arc::new(MockLedger::new());
        let config = Arc::new(WatcherConfig::for_tests());
        let discovery = Discovery::new(ledger.clone(), config.clone());
        let fetcher = StateFetcher::new(ledger.clone(), config.clone());
        (ledger, config, discovery, fetcher)
    }

    #[tokio::test]
    async fn test_report_marks_eligibility() {
        let (ledger, config, discovery, fetcher) = setup();
        ledger.create(snapshot("0x1", NOW_MS - 7_200_000, true, false));
        ledger.create(snapshot("0x2", NOW_MS - 1_800_000, true, false));
        ledger.create(snapshot("0x3", NOW_MS - 7_200_000, true, true));
        ledger.push_event(Some("0x4"));

        let report = diagnose(&config, &discovery, &fetcher, None, millis_to_datetime(NOW_MS))
            .await
            .unwrap();

        let eligible: Vec<_> = report.eligible().map(|c| c.id.clone()).collect();
        assert_eq!(eligible, vec![ObjectId::new("0x1")]);
        assert_eq!(report.commitments.len(), 3);
        assert_eq!(report.commitments[0].seconds_past_grace, 3600);
        assert_eq!(report.commitments[1].seconds_past_grace, -1800);
        assert_eq!(report.unavailable.len(), 1);
        assert!(ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_single_id_skips_discovery() {
        let (ledger, config, discovery, fetcher) = setup();
        ledger.create(snapshot("0x1", NOW_MS - 7_200_000, true, false));
        ledger.create(snapshot("0x2", NOW_MS - 7_200_000, true, false));

        let report = diagnose(
            &config,
            &discovery,
            &fetcher,
            Some(ObjectId::new("0x2")),
            millis_to_datetime(NOW_MS),
        )
        .await
        .unwrap();

        assert_eq!(ledger.event_queries(), 0);
        assert_eq!(report.commitments.len(), 1);
        assert_eq!(report.commitments[0].id, ObjectId::new("0x2"));
    }
}
