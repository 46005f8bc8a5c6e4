//! Error taxonomy for moderation operations.
//!
//! Every precondition failure maps to exactly one variant so that callers can
//! render a precise message. Only [`ModerationError::TransactionConflict`] is
//! safe to retry.

use thiserror::Error;

/// Result type for moderation operations.
pub type Result<T> = std::result::Result<T, ModerationError>;

/// Errors surfaced by the moderation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModerationError {
    /// The referenced record does not exist (or is not visible to the caller).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The report has already been published and accepts no further votes.
    #[error("report has already been reviewed and approved")]
    AlreadyFinalized,

    /// The moderator has already voted on this report.
    #[error("moderator has already voted on this report")]
    DuplicateVote,

    /// A submitted report failed validation.
    #[error("invalid report: {0}")]
    InvalidReport(String),

    /// The caller lacks the privileges for this operation.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// The store detected a write conflict; the whole operation may be retried.
    #[error("transaction conflict, retry the operation")]
    TransactionConflict,

    /// Infrastructure failure in the persistent store.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ModerationError {
    /// Whether the failed operation can be retried as a whole.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionConflict)
    }

    /// Whether this is a caller-side error (as opposed to an infrastructure one).
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::TransactionConflict | Self::StoreUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(ModerationError::TransactionConflict.is_retryable());
        assert!(!ModerationError::DuplicateVote.is_retryable());
        assert!(!ModerationError::AlreadyFinalized.is_retryable());
        assert!(!ModerationError::NotFound("report").is_retryable());
        assert!(!ModerationError::StoreUnavailable("disk full".into()).is_retryable());
    }

    #[test]
    fn test_client_errors() {
        assert!(ModerationError::DuplicateVote.is_client_error());
        assert!(ModerationError::InvalidReport("empty".into()).is_client_error());
        assert!(!ModerationError::TransactionConflict.is_client_error());
        assert!(!ModerationError::StoreUnavailable("io".into()).is_client_error());
    }

    #[test]
    fn test_display_names_entity() {
        assert_eq!(
            ModerationError::NotFound("notification").to_string(),
            "notification not found"
        );
    }
}
