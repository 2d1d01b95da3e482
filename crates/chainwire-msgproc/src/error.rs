//! Error types for message rules.

use chainwire_core::{CoreError, FatalError, Status};
use thiserror::Error;

/// Why a rule refused an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The envelope could not be split into signed data.
    #[error("could not convert message to signedData: {0}")]
    CannotExtractSignedData(CoreError),

    #[error("broadcast client identity expired")]
    IdentityExpired,

    #[error("message was empty")]
    EmptyMessage,

    #[error("message payload is {size} bytes and exceeds maximum allowed {max} bytes")]
    MessageTooLarge { size: usize, max: u32 },

    #[error("signature check failed: {0}")]
    InvalidSignature(CoreError),

    /// The process is misconfigured. Never a rejection.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl RuleError {
    /// Response status for a rejected envelope.
    pub fn status(&self) -> Status {
        match self {
            RuleError::CannotExtractSignedData(_) | RuleError::EmptyMessage => Status::BadRequest,
            RuleError::IdentityExpired | RuleError::InvalidSignature(_) => Status::Forbidden,
            RuleError::MessageTooLarge { .. } => Status::RequestEntityTooLarge,
            RuleError::Fatal(_) => Status::InternalServerError,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RuleError::Fatal(_))
    }
}

/// Result type for rule evaluation.
pub type Result<T> = std::result::Result<T, RuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RuleError::EmptyMessage.status(), Status::BadRequest);
        assert_eq!(RuleError::IdentityExpired.status(), Status::Forbidden);
        assert_eq!(
            RuleError::MessageTooLarge { size: 11, max: 10 }.status(),
            Status::RequestEntityTooLarge
        );
        assert_eq!(
            RuleError::Fatal(FatalError::MissingOrdererConfig).status(),
            Status::InternalServerError
        );
    }

    #[test]
    fn test_only_fatal_is_fatal() {
        assert!(RuleError::from(FatalError::MissingOrdererConfig).is_fatal());
        assert!(!RuleError::IdentityExpired.is_fatal());
        assert!(!RuleError::CannotExtractSignedData(CoreError::MissingHeader).is_fatal());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            RuleError::IdentityExpired.to_string(),
            "broadcast client identity expired"
        );
        assert_eq!(
            RuleError::CannotExtractSignedData(CoreError::MissingHeader).to_string(),
            "could not convert message to signedData: envelope must have a header"
        );
    }
}
