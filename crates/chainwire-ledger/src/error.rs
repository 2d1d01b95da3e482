//! Error types for the ledger module.

use chainwire_core::CoreError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored block failed to decode.
    #[error("corrupt block {number}: {source}")]
    Corrupted {
        number: u64,
        #[source]
        source: CoreError,
    },

    /// Block number is past the tip or was dropped by retention.
    #[error("block {0} not found")]
    NotFound(u64),

    #[error("block has no header")]
    MissingHeader,

    #[error("block number {got} does not extend chain of height {expected}")]
    InvalidBlockNumber { expected: u64, got: u64 },

    #[error("block {number} previous hash does not match chain tip")]
    PreviousHashMismatch { number: u64 },

    /// The ledger or its factory has been closed.
    #[error("ledger closed")]
    Closed,

    #[error("lock poisoned: {0}")]
    Poisoned(String),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),

    #[error("migration error: {0}")]
    Migration(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
