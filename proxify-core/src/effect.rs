//! Effects (side effects as data).
//!
//! A vote transition describes the writes it needs as a list of effects. A
//! store applies the whole list inside the same transaction that produced the
//! snapshot, so the vote, the status change and the notification commit
//! together or not at all.

use serde::{Deserialize, Serialize};

use crate::model::{ReportId, ReviewVote};
use crate::notification::{ModerationEvent, NewNotification};

/// All writes a vote transition can request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Insert the vote. Fails with a duplicate-vote error if the
    /// (report, moderator) pair already exists.
    RecordVote { vote: ReviewVote },

    /// Publish the report.
    MarkReviewed { report_id: ReportId },

    /// Remove the report and, by cascade, its votes.
    DeleteReport { report_id: ReportId },

    /// Insert a notification.
    Notify { notification: NewNotification },

    /// Append to the moderation audit log.
    LogEvent { event: ModerationEvent },
}

impl Effect {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Effect::RecordVote { .. } => "record_vote",
            Effect::MarkReviewed { .. } => "mark_reviewed",
            Effect::DeleteReport { .. } => "delete_report",
            Effect::Notify { .. } => "notify",
            Effect::LogEvent { .. } => "log_event",
        }
    }
}
