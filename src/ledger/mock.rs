//! In-memory ledger for tests, with failure injection

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::models::*;
use crate::ledger::LedgerClient;

/// Abort code the mock settle function raises on a terminal commitment
pub const MOCK_TERMINAL_ABORT: u64 = 3;

pub fn move_abort(function: &str, code: u64) -> String {
    format!(
        "MoveAbort(MoveLocation {{ module: ModuleId {{ address: 0x2a, name: Identifier(\"alarm\") }}, \
         function: 2, instruction: 14, function_name: Some(\"{}\") }}, {}) in command 0",
        function, code
    )
}

pub fn snapshot(id: &str, deadline_ms: u64, active: bool, completed: bool) -> CommitmentSnapshot {
    CommitmentSnapshot {
        id: ObjectId::new(id),
        owner: "0xowner".to_string(),
        category: "Wake up early".to_string(),
        deadline_ms,
        deposit_amount: 1_000_000_000,
        beneficiary: "0xcharity".to_string(),
        active,
        completed,
    }
}

#[derive(Default)]
pub struct MockLedger {
    commitments: Mutex<BTreeMap<ObjectId, CommitmentSnapshot>>,
    /// Creation order, oldest first
    events: Mutex<Vec<Option<ObjectId>>>,
    fail_event_page: Mutex<Option<usize>>,
    event_queries: AtomicUsize,
    fail_fetch: Mutex<HashSet<ObjectId>>,
    fail_settlement: Mutex<HashMap<ObjectId, String>>,
    fail_build: AtomicBool,
    reject_submission: Mutex<HashMap<ObjectId, LedgerError>>,
    complete_after_build: Mutex<HashSet<ObjectId>>,
    submissions: Mutex<Vec<(ObjectId, tokio::time::Instant)>>,
    submit_delay: Mutex<Duration>,
    fetch_delay: Mutex<HashMap<ObjectId, Duration>>,
    balance: Mutex<u128>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a commitment and emit its creation event
    pub fn create(&self, snapshot: CommitmentSnapshot) {
        self.events.lock().push(Some(snapshot.id.clone()));
        self.commitments.lock().insert(snapshot.id.clone(), snapshot);
    }

    /// Emit a creation event without (or with a duplicate) object
    pub fn push_event(&self, id: Option<&str>) {
        self.events.lock().push(id.map(ObjectId::new));
    }

    pub fn complete(&self, id: &str) {
        if let Some(c) = self.commitments.lock().get_mut(&ObjectId::new(id)) {
            c.completed = true;
        }
    }

    pub fn state(&self, id: &str) -> Option<CommitmentSnapshot> {
        self.commitments.lock().get(&ObjectId::new(id)).cloned()
    }

    /// Fail the n-th (zero based) event query from now on
    pub fn fail_event_page(&self, n: usize) {
        *self.fail_event_page.lock() = Some(self.event_queries.load(Ordering::SeqCst) + n);
    }

    pub fn fail_fetch(&self, id: &str) {
        self.fail_fetch.lock().insert(ObjectId::new(id));
    }

    pub fn fail_settlement(&self, id: &str, error: &str) {
        self.fail_settlement
            .lock()
            .insert(ObjectId::new(id), error.to_string());
    }

    pub fn clear_settlement_failure(&self, id: &str) {
        self.fail_settlement.lock().remove(&ObjectId::new(id));
    }

    pub fn fail_build(&self) {
        self.fail_build.store(true, Ordering::SeqCst);
    }

    /// Node rejects the submission at the RPC layer
    pub fn reject_submission(&self, id: &str, error: LedgerError) {
        self.reject_submission.lock().insert(ObjectId::new(id), error);
    }

    /// Owner completes the commitment between build and execute
    pub fn complete_after_build(&self, id: &str) {
        self.complete_after_build.lock().insert(ObjectId::new(id));
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock() = delay;
    }

    pub fn set_fetch_delay(&self, id: &str, delay: Duration) {
        self.fetch_delay.lock().insert(ObjectId::new(id), delay);
    }

    pub fn set_balance(&self, mist: u128) {
        *self.balance.lock() = mist;
    }

    pub fn submissions(&self) -> Vec<ObjectId> {
        self.submissions.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn submission_times(&self) -> Vec<tokio::time::Instant> {
        self.submissions.lock().iter().map(|(_, at)| *at).collect()
    }

    pub fn event_queries(&self) -> usize {
        self.event_queries.load(Ordering::SeqCst)
    }

    fn cursor_for(index: usize) -> EventCursor {
        EventCursor {
            tx_digest: format!("tx{}", index),
            event_seq: "0".to_string(),
        }
    }

    fn index_of(cursor: &EventCursor) -> Option<usize> {
        cursor.tx_digest.strip_prefix("tx")?.parse().ok()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn query_events(&self, query: &EventQuery) -> LedgerResult<EventPage> {
        let call = self.event_queries.fetch_add(1, Ordering::SeqCst);
        if *self.fail_event_page.lock() == Some(call) {
            return Err(LedgerError::Transport {
                method: "suix_queryEvents".to_string(),
                message: "connection reset".to_string(),
            });
        }

        let events = self.events.lock().clone();
        let mut order: Vec<usize> = (0..events.len()).collect();
        if query.descending {
            order.reverse();
        }

        let start = match query.cursor.as_ref().and_then(Self::index_of) {
            Some(after) => order
                .iter()
                .position(|i| *i == after)
                .map(|p| p + 1)
                .unwrap_or(order.len()),
            None => 0,
        };

        let page: Vec<usize> = order.iter().skip(start).take(query.limit).copied().collect();
        let has_next_page = start + page.len() < order.len();

        Ok(EventPage {
            events: page
                .iter()
                .map(|i| CreationEvent {
                    cursor: Self::cursor_for(*i),
                    object_id: events[*i].clone(),
                })
                .collect(),
            next_cursor: page.last().map(|i| Self::cursor_for(*i)),
            has_next_page,
        })
    }

    async fn get_object(&self, id: &ObjectId) -> LedgerResult<ObjectState> {
        let delay = self.fetch_delay.lock().get(id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_fetch.lock().contains(id) {
            return Err(LedgerError::Rpc {
                method: "sui_getObject".to_string(),
                code: -32000,
                message: "internal node error".to_string(),
            });
        }

        Ok(match self.commitments.lock().get(id) {
            Some(snapshot) => ObjectState::Found(snapshot.clone()),
            None => ObjectState::NotFound,
        })
    }

    async fn build_move_call(&self, request: &MoveCallRequest) -> LedgerResult<UnsignedTransaction> {
        if self.fail_build.load(Ordering::SeqCst) {
            return Err(LedgerError::Rpc {
                method: "unsafe_moveCall".to_string(),
                code: -32602,
                message: "invalid object reference".to_string(),
            });
        }

        let target = request.arguments.first().cloned().unwrap_or_default();
        if self.complete_after_build.lock().remove(&ObjectId::new(&target)) {
            self.complete(&target);
        }
        Ok(UnsignedTransaction {
            tx_bytes: BASE64.encode(target.as_bytes()),
        })
    }

    async fn execute_transaction(&self, tx: &SignedTransaction) -> LedgerResult<ExecutionEffects> {
        let raw = BASE64.decode(&tx.tx_bytes).map_err(|e| LedgerError::MalformedResponse {
            method: "sui_executeTransactionBlock".to_string(),
            message: e.to_string(),
        })?;
        let id = ObjectId::new(String::from_utf8_lossy(&raw));

        let delay = *self.submit_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let index = {
            let mut submissions = self.submissions.lock();
            submissions.push((id.clone(), tokio::time::Instant::now()));
            submissions.len()
        };
        let digest = format!("digest-{}", index);

        if let Some(error) = self.reject_submission.lock().get(&id).cloned() {
            return Err(error);
        }

        if let Some(error) = self.fail_settlement.lock().get(&id).cloned() {
            return Ok(ExecutionEffects {
                digest,
                status: ExecutionStatus::Failure,
                error: Some(error),
            });
        }

        let mut commitments = self.commitments.lock();
        let effects = match commitments.get_mut(&id) {
            None => ExecutionEffects {
                digest,
                status: ExecutionStatus::Failure,
                error: Some(format!("InputObjectDeleted {{ object_id: {} }}", id)),
            },
            Some(c) if c.is_terminal() => ExecutionEffects {
                digest,
                status: ExecutionStatus::Failure,
                error: Some(move_abort("fail_alarm", MOCK_TERMINAL_ABORT)),
            },
            Some(c) => {
                c.active = false;
                ExecutionEffects {
                    digest,
                    status: ExecutionStatus::Success,
                    error: None,
                }
            }
        };

        Ok(effects)
    }

    async fn get_balance(&self, _owner: &str) -> LedgerResult<u128> {
        Ok(*self.balance.lock())
    }
}
