use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places of SUI (1 SUI = 10^9 MIST)
pub const SUI_DECIMALS: u32 = 9;

/// Ledger object identifier (`0x`-prefixed hex, normalized to lowercase)
///
/// Ordering is lexicographic on the normalized form, which gives sweeps a
/// stable processing order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim().to_ascii_lowercase();
        if trimmed.starts_with("0x") {
            Self(trimmed)
        } else {
            Self(format!("0x{}", trimmed))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(value: &str) -> Self {
        ObjectId::new(value)
    }
}

/// Current field snapshot of one commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentSnapshot {
    pub id: ObjectId,
    pub owner: String,
    /// Descriptive label, not used in any decision
    pub category: String,
    /// Ledger clock milliseconds since the Unix epoch
    pub deadline_ms: u64,
    /// Escrowed amount in MIST
    pub deposit_amount: u64,
    pub beneficiary: String,
    pub active: bool,
    pub completed: bool,
}

impl CommitmentSnapshot {
    /// Deposit still escrowed and forced settlement meaningful
    pub fn is_open(&self) -> bool {
        self.active && !self.completed
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        millis_to_datetime(self.deadline_ms)
    }

    pub fn deposit_sui(&self) -> Decimal {
        mist_to_sui(self.deposit_amount as u128)
    }
}

/// Result of reading one object from the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectState {
    Found(CommitmentSnapshot),
    /// Object does not exist or was deleted
    NotFound,
    /// Object exists but does not carry commitment fields
    NotACommitment(String),
}

/// Position inside the event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCursor {
    pub tx_digest: String,
    pub event_seq: String,
}

/// One creation-event record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationEvent {
    pub cursor: EventCursor,
    /// Created identifier, `None` when the payload lacks the configured field
    pub object_id: Option<ObjectId>,
}

#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub events: Vec<CreationEvent>,
    pub next_cursor: Option<EventCursor>,
    pub has_next_page: bool,
}

/// Query for one page of creation events
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// Fully qualified event struct, `<package>::<module>::<Struct>`
    pub event_type: String,
    pub cursor: Option<EventCursor>,
    pub limit: usize,
    pub descending: bool,
}

/// A move call to be built into transaction bytes by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCallRequest {
    pub signer: String,
    pub package: String,
    pub module: String,
    pub function: String,
    pub arguments: Vec<String>,
    pub gas_budget: u64,
}

/// Unsigned transaction bytes as returned by the ledger (base64)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub tx_bytes: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx_bytes: String,
    /// Serialized `flag || signature || public key`, base64
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

/// Terminal effects of an executed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEffects {
    pub digest: String,
    pub status: ExecutionStatus,
    /// Execution error reported by the ledger on failure
    pub error: Option<String>,
}

pub fn millis_to_datetime(ms: u64) -> DateTime<Utc> {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn mist_to_sui(mist: u128) -> Decimal {
    let mist = i128::try_from(mist).unwrap_or(i128::MAX);
    Decimal::try_from_i128_with_scale(mist, SUI_DECIMALS).unwrap_or(Decimal::MAX)
}
