//! Repository abstraction for moderation persistence.
//!
//! This module defines the `ReportRepository` trait that abstracts storage of
//! reports, moderator votes, notifications and the moderation audit log.
//! Implementations provide different backends (in-memory, SQLite).
//!
//! The one operation with real invariants is [`ReportRepository::commit_vote`]:
//! a backend must read the snapshot, run the pure transition and apply its
//! effects inside a single transaction, so that a concurrent vote on the same
//! report observes either none or all of those writes.

mod memory;
mod sqlite;

#[cfg(test)]
mod conformance;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use proxify_core::{
    ModerationError, ModerationEvent, Notification, QuorumPolicy, Report, ReportId, ReportStatus,
    ReviewVote, SubmitterStats, UserId, VoteCommand, VotePlan, VoteTally,
};

/// Errors reported by storage backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The backend failed to perform an operation.
    #[error("storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    /// Stored data could not be decoded.
    #[error("corrupted {what} in store")]
    Corruption { what: String },

    /// Another writer holds the lock; the transaction did not commit.
    #[error("write conflict during {operation}")]
    Conflict { operation: &'static str },

    /// A vote for this (report, moderator) pair already exists.
    #[error("vote already recorded for this moderator")]
    DuplicateVote,

    /// The vote refers to a report that does not exist.
    #[error("report does not exist")]
    MissingReport,
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }
}

impl From<RepositoryError> for ModerationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DuplicateVote => ModerationError::DuplicateVote,
            RepositoryError::MissingReport => ModerationError::NotFound("report"),
            RepositoryError::Conflict { .. } => ModerationError::TransactionConflict,
            other => ModerationError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Result ordering for report listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Filter for report listings. Empty `statuses` means any status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportQuery {
    pub submitter: Option<UserId>,
    pub statuses: Vec<ReportStatus>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl ReportQuery {
    /// Reports still waiting for quorum.
    pub fn awaiting_review() -> Self {
        Self {
            statuses: vec![ReportStatus::Pending, ReportStatus::AiReviewed],
            ..Self::default()
        }
    }

    /// Published reports, newest first.
    pub fn published(limit: usize) -> Self {
        Self {
            statuses: vec![ReportStatus::Reviewed],
            order: SortOrder::NewestFirst,
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn by_submitter(submitter: UserId, status: Option<ReportStatus>) -> Self {
        Self {
            submitter: Some(submitter),
            statuses: status.into_iter().collect(),
            ..Self::default()
        }
    }

    pub(crate) fn matches(&self, report: &Report) -> bool {
        self.submitter
            .as_ref()
            .map_or(true, |submitter| &report.submitter == submitter)
            && (self.statuses.is_empty() || self.statuses.contains(&report.status))
    }
}

/// Repository trait for moderation state.
///
/// Read methods observe committed state only.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    // =========================================================================
    // Reports
    // =========================================================================

    async fn insert_report(&self, report: &Report) -> Result<(), RepositoryError>;

    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>, RepositoryError>;

    async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<Report>, RepositoryError>;

    /// Move a report from `from` to `to`. Returns false if the report is
    /// missing or not currently in `from`.
    async fn transition_status(
        &self,
        id: &ReportId,
        from: ReportStatus,
        to: ReportStatus,
    ) -> Result<bool, RepositoryError>;

    /// Live counts for one submitter. `rejected` comes from the audit log since
    /// rejected reports no longer exist.
    async fn submitter_stats(&self, submitter: &UserId) -> Result<SubmitterStats, RepositoryError>;

    // =========================================================================
    // Review records
    // =========================================================================

    /// Insert a single vote. The (report, moderator) uniqueness is enforced by
    /// the write itself, never by a preceding read.
    async fn record_vote(&self, vote: &ReviewVote) -> Result<(), RepositoryError>;

    async fn count_votes(&self, report_id: &ReportId) -> Result<VoteTally, RepositoryError>;

    async fn has_voted(
        &self,
        report_id: &ReportId,
        moderator: &UserId,
    ) -> Result<bool, RepositoryError>;

    async fn list_votes(&self, report_id: &ReportId) -> Result<Vec<ReviewVote>, RepositoryError>;

    /// Decide and commit a vote atomically.
    ///
    /// Reads the report, tally and prior-vote flag, runs
    /// [`proxify_core::plan_vote`], applies every effect and commits, all in
    /// one transaction. Precondition failures from the transition are
    /// returned unchanged and leave no writes behind.
    async fn commit_vote(
        &self,
        command: &VoteCommand,
        policy: &QuorumPolicy,
    ) -> Result<VotePlan, ModerationError>;

    // =========================================================================
    // Notifications
    // =========================================================================

    async fn insert_notification(&self, notification: &Notification)
        -> Result<(), RepositoryError>;

    /// Notifications for `recipient`, oldest first.
    async fn list_notifications(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError>;

    async fn unread_count(&self, recipient: &UserId) -> Result<u64, RepositoryError>;

    /// Returns false if no such notification belongs to `recipient`.
    async fn mark_notification_read(
        &self,
        recipient: &UserId,
        id: &Uuid,
    ) -> Result<bool, RepositoryError>;

    /// Returns how many notifications changed from unread to read.
    async fn mark_all_read(&self, recipient: &UserId) -> Result<u64, RepositoryError>;

    /// Returns false if no such notification belongs to `recipient`.
    async fn delete_notification(
        &self,
        recipient: &UserId,
        id: &Uuid,
    ) -> Result<bool, RepositoryError>;

    // =========================================================================
    // Audit log
    // =========================================================================

    /// Audit entries for a report, oldest first. Survives report deletion.
    async fn list_events(
        &self,
        report_id: &ReportId,
    ) -> Result<Vec<ModerationEvent>, RepositoryError>;
}
