use std::time::Duration;

use thiserror::Error;

use crate::ledger::models::ObjectId;

/// Top-level error type for the watcher
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Missing or invalid configuration. Fatal: aborts startup before any sweep runs.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Fetch error for {id}: {source}")]
    Fetch {
        id: ObjectId,
        #[source]
        source: LedgerError,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the ledger client for a single remote call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Transport error calling {method}: {message}")]
    Transport { method: String, message: String },

    #[error("RPC error {code} from {method}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Malformed response from {method}: {message}")]
    MalformedResponse { method: String, message: String },
}

impl LedgerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LedgerError::Timeout { .. })
    }
}

/// Creation-event scan errors. Recoverable: the sweep skips this cycle.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to fetch creation-event page {page}: {source}")]
    PageFetch {
        page: usize,
        #[source]
        source: LedgerError,
    },

    #[error("Cursor store error: {0}")]
    CursorStore(String),
}

/// Credential parsing and signing errors
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Invalid private key encoding: {0}")]
    InvalidEncoding(String),

    #[error("Unsupported key scheme flag: {0:#04x}")]
    UnsupportedScheme(u8),

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Invalid transaction bytes: {0}")]
    InvalidTransaction(String),
}

impl From<config::ConfigError> for WatcherError {
    fn from(error: config::ConfigError) -> Self {
        WatcherError::Config(error.to_string())
    }
}

impl From<serde_json::Error> for WatcherError {
    fn from(error: serde_json::Error) -> Self {
        WatcherError::Internal(format!("JSON error: {:?}", error))
    }
}

/// Result type alias for the watcher
pub type WatcherResult<T> = Result<T, WatcherError>;

/// Result type alias for ledger calls
pub type LedgerResult<T> = Result<T, LedgerError>;
