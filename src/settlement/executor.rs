use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::WatcherConfig;
use crate::error::LedgerError;
use crate::ledger::models::*;
use crate::ledger::signer::WatcherSigner;
use crate::ledger::LedgerClient;

/// Result of one forced-settlement attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Deposit moved to the beneficiary
    Settled { digest: String },
    /// Commitment was already terminal (owner completed, cancelled, settled
    /// by someone else, or gone). Benign no-op.
    AlreadySettled { reason: String },
    Failed(SettlementFailure),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementFailure {
    #[error("failed to build transaction: {0}")]
    Build(LedgerError),

    #[error("failed to sign transaction: {0}")]
    Signing(String),

    #[error("submission failed: {0}")]
    Submit(LedgerError),

    #[error("execution failed in {digest}: {error}")]
    Execution { digest: String, error: String },
}

/// What a failed execution's error text tells us on its own
#[derive(Debug, Clone, PartialEq, Eq)]
enum ErrorHint {
    Terminal(String),
    Unknown,
}

/// Builds, signs, submits and interprets one settlement transaction
pub struct SettlementExecutor {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<WatcherSigner>,
    config: Arc<WatcherConfig>,
}

impl SettlementExecutor {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<WatcherSigner>,
        config: Arc<WatcherConfig>,
    ) -> Self {
        Self {
            ledger,
            signer,
            config,
        }
    }

    /// Exactly one submission; never retried here
    #[instrument(skip(self, id), fields(object_id = %id))]
    pub async fn settle(&self, id: &ObjectId) -> SettlementOutcome {
        info!("⚖️  Attempting forced settlement of {}", id);

        let request = MoveCallRequest {
            signer: self.signer.address().to_string(),
            package: self.config.package_id.clone(),
            module: self.config.module.clone(),
            function: self.config.settle_function.clone(),
            arguments: vec![id.to_string(), self.config.clock_object_id.clone()],
            gas_budget: self.config.max_gas_budget,
        };

        let unsigned = match self.bounded("build_move_call", self.ledger.build_move_call(&request)).await {
            Ok(unsigned) => unsigned,
            Err(e) => {
                // the node refuses to build against deleted objects
                return self
                    .confirm_terminal_or(id, SettlementFailure::Build(e))
                    .await;
            }
        };

        let signed = match self.signer.sign(unsigned) {
            Ok(signed) => signed,
            Err(e) => {
                error!("❌ Failed to sign settlement for {}: {}", id, e);
                return SettlementOutcome::Failed(SettlementFailure::Signing(e.to_string()));
            }
        };

        let effects = match tokio::time::timeout(
            self.config.submission_timeout,
            self.ledger.execute_transaction(&signed),
        )
        .await
        {
            Ok(Ok(effects)) => effects,
            Ok(Err(e)) => {
                // stale object versions are rejected before execution
                warn!("⚠️  Submission rejected for {}: {}", id, e);
                return self
                    .confirm_terminal_or(id, SettlementFailure::Submit(e))
                    .await;
            }
            Err(_) => {
                // the transaction may still land; next sweep sees the result
                let e = LedgerError::Timeout {
                    operation: "execute_transaction",
                    after: self.config.submission_timeout,
                };
                error!("❌ Submission for {} timed out: {}", id, e);
                return SettlementOutcome::Failed(SettlementFailure::Submit(e));
            }
        };

        match effects.status {
            ExecutionStatus::Success => {
                info!(
                    "✅ Successfully settled {} (tx: {}) to beneficiary",
                    id, effects.digest
                );
                SettlementOutcome::Settled {
                    digest: effects.digest,
                }
            }
            ExecutionStatus::Failure => {
                let error = effects.error.unwrap_or_else(|| "unknown execution error".to_string());
                match self.hint(&error) {
                    ErrorHint::Terminal(reason) => {
                        info!("⏭️  {} already terminal ({}), nothing to do", id, reason);
                        SettlementOutcome::AlreadySettled { reason }
                    }
                    ErrorHint::Unknown => {
                        self.confirm_terminal_or(
                            id,
                            SettlementFailure::Execution {
                                digest: effects.digest,
                                error,
                            },
                        )
                        .await
                    }
                }
            }
        }
    }

    /// Re-read the object: a commitment that is now gone or terminal turns the
    /// failure into a benign no-op
    async fn confirm_terminal_or(&self, id: &ObjectId, failure: SettlementFailure) -> SettlementOutcome {
        match self.bounded("get_object", self.ledger.get_object(id)).await {
            Ok(ObjectState::NotFound) => {
                info!("⏭️  {} no longer exists, nothing to do", id);
                SettlementOutcome::AlreadySettled {
                    reason: "object no longer exists".to_string(),
                }
            }
            Ok(ObjectState::Found(snapshot)) if snapshot.is_terminal() => {
                let reason = if snapshot.completed {
                    "owner completed the commitment"
                } else {
                    "commitment no longer active"
                };
                info!("⏭️  {} already terminal ({}), nothing to do", id, reason);
                SettlementOutcome::AlreadySettled {
                    reason: reason.to_string(),
                }
            }
            Ok(_) => {
                error!("❌ Settlement of {} failed: {}", id, failure);
                SettlementOutcome::Failed(failure)
            }
            Err(e) => {
                warn!("⚠️  Could not re-check {} after failure: {}", id, e);
                error!("❌ Settlement of {} failed: {}", id, failure);
                SettlementOutcome::Failed(failure)
            }
        }
    }

    fn hint(&self, error: &str) -> ErrorHint {
        classify_execution_error(error, &self.config.settle_function, &self.config.terminal_abort_codes)
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl std::future::Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        tokio::time::timeout(self.config.rpc_timeout, call)
            .await
            .unwrap_or(Err(LedgerError::Timeout {
                operation,
                after: self.config.rpc_timeout,
            }))
    }
}

/// Ledger error kinds naming an input object that no longer exists
const MISSING_OBJECT_KINDS: [&str; 4] = ["ObjectDeleted", "InputObjectDeleted", "ObjectNotFound", "notExists"];

fn classify_execution_error(error: &str, settle_function: &str, terminal_codes: &[u64]) -> ErrorHint {
    let names_missing_object = error
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|word| MISSING_OBJECT_KINDS.contains(&word));
    if names_missing_object {
        return ErrorHint::Terminal("object no longer exists".to_string());
    }

    if let Some(code) = move_abort_code(error, settle_function) {
        if terminal_codes.contains(&code) {
            return ErrorHint::Terminal(format!("{} aborted with code {}", settle_function, code));
        }
    }

    ErrorHint::Unknown
}

/// Abort code of a `MoveAbort(MoveLocation { .. function_name: Some("<f>") }, <code>)`
/// raised by `function`
fn move_abort_code(error: &str, function: &str) -> Option<u64> {
    let start = error.find("MoveAbort(")?;
    let abort = &error[start..];

    if !abort.contains(&format!("function_name: Some(\"{}\")", function)) {
        return None;
    }

    let location_end = abort.rfind("}, ")?;
    let rest = &abort[location_end + 3..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
