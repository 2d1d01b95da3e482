//! Error types for the channel processor.

use chainwire_core::{CoreError, FatalError, HeaderType, Status};
use chainwire_ledger::LedgerError;
use chainwire_msgproc::RuleError;
use thiserror::Error;

/// Errors that can occur while ordering an envelope.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The envelope or one of its headers did not decode.
    #[error("bad envelope: {0}")]
    Envelope(#[from] CoreError),

    /// A rule refused the envelope.
    #[error("envelope rejected: {0}")]
    Rejected(RuleError),

    /// The process is misconfigured and must stop.
    #[error("fatal: {0}")]
    Fatal(FatalError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("envelope for channel '{got}' submitted to channel '{expected}'")]
    WrongChannel { expected: String, got: String },

    #[error("unsupported header type {}", HeaderType::describe(*.0))]
    UnsupportedType(i32),

    /// `open` found no genesis block.
    #[error("ledger has no blocks")]
    EmptyLedger,
}

impl ProcessorError {
    /// Response status for the submitter.
    pub fn status(&self) -> Status {
        match self {
            ProcessorError::Envelope(_)
            | ProcessorError::WrongChannel { .. }
            | ProcessorError::UnsupportedType(_) => Status::BadRequest,
            ProcessorError::Rejected(err) => err.status(),
            ProcessorError::Ledger(LedgerError::Closed) => Status::ServiceUnavailable,
            ProcessorError::Fatal(_) | ProcessorError::Ledger(_) | ProcessorError::EmptyLedger => {
                Status::InternalServerError
            }
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ProcessorError::Fatal(_))
    }
}

impl From<RuleError> for ProcessorError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Fatal(fatal) => ProcessorError::Fatal(fatal),
            other => ProcessorError::Rejected(other),
        }
    }
}

impl From<FatalError> for ProcessorError {
    fn from(err: FatalError) -> Self {
        ProcessorError::Fatal(err)
    }
}

/// Result type for processor operations.
pub type Result<T> = std::result::Result<T, ProcessorError>;
