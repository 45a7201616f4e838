// Forced settlement of eligible commitments
pub mod executor;
pub mod policy;

pub use executor::{SettlementExecutor, SettlementOutcome};
pub use policy::{Admission, FailurePolicy, FailureTracker};
