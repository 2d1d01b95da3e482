//! Error types for the envelope protocol core.

use thiserror::Error;

use crate::types::HeaderType;

/// Recoverable errors raised while decoding or inspecting protocol messages.
///
/// These propagate to the immediate caller, which decides whether to
/// reject, retry or log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("malformed {kind}: {reason}")]
    MalformedMessage { kind: &'static str, reason: String },

    #[error("invalid envelope payload: envelope is nil")]
    NilEnvelope,

    #[error("envelope must have a header")]
    MissingHeader,

    #[error("channel header not set")]
    MissingChannelHeader,

    #[error("error unmarshaling channel header: {0}")]
    MalformedChannelHeader(String),

    #[error("invalid type {}, expected {expected}", HeaderType::describe(*.actual))]
    TypeMismatch { actual: i32, expected: HeaderType },

    #[error("block data is nil")]
    NilBlockData,

    #[error("envelope index {index} out of bounds for block carrying {count} envelopes")]
    EnvelopeIndexOutOfBounds { index: usize, count: usize },

    #[error("error generating random nonce: {0}")]
    EntropyUnavailable(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,
}

impl CoreError {
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        CoreError::MalformedMessage {
            kind,
            reason: reason.into(),
        }
    }
}

/// Conditions that must never happen in a correctly wired process.
///
/// A `FatalError` is not a business error: hosts surface it to their
/// top-level supervisor as a startup or crash failure and never turn it
/// into a rejected-transaction response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("programming error: orderer config not found")]
    MissingOrdererConfig,

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl From<CoreError> for FatalError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::EntropyUnavailable(msg) => FatalError::EntropyUnavailable(msg),
            other => FatalError::Invariant(other.to_string()),
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_names_both_types() {
        let err = CoreError::TypeMismatch {
            actual: HeaderType::ChaincodePackage.to_i32(),
            expected: HeaderType::Config,
        };
        assert_eq!(err.to_string(), "invalid type CHAINCODE_PACKAGE, expected CONFIG");

        let unknown = CoreError::TypeMismatch {
            actual: 42,
            expected: HeaderType::Config,
        };
        assert_eq!(unknown.to_string(), "invalid type 42, expected CONFIG");
    }

    #[test]
    fn test_entropy_failure_stays_distinct_when_fatal() {
        let fatal: FatalError = CoreError::EntropyUnavailable("no source".into()).into();
        assert_eq!(fatal, FatalError::EntropyUnavailable("no source".into()));

        let fatal: FatalError = CoreError::MissingHeader.into();
        assert!(matches!(fatal, FatalError::Invariant(_)));
    }
}
