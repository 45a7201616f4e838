// Ledger client - the watcher's only door to the remote chain
pub mod models;
pub mod signer;
pub mod sui;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;

use crate::error::LedgerResult;
use models::*;

/// Ledger capability set consumed by the watcher
///
/// Implementations own encoding and transport; callers own timeouts.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch one page of events of a given type
    async fn query_events(&self, query: &EventQuery) -> LedgerResult<EventPage>;

    /// Fetch current state of an object
    async fn get_object(&self, id: &ObjectId) -> LedgerResult<ObjectState>;

    /// Have the node build transaction bytes for a move call
    async fn build_move_call(&self, request: &MoveCallRequest) -> LedgerResult<UnsignedTransaction>;

    /// Submit a signed transaction and wait for its effects
    async fn execute_transaction(&self, tx: &SignedTransaction) -> LedgerResult<ExecutionEffects>;

    /// Total balance of the native coin, in MIST
    async fn get_balance(&self, owner: &str) -> LedgerResult<u128>;
}
