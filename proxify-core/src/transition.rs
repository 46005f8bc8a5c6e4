//! Pure vote transition.
//!
//! Given what a store read inside its transaction (the report, the current
//! tally, whether this moderator already voted) and the incoming vote, decide
//! the outcome and the writes needed to get there. This function has NO side
//! effects; stores execute the returned [`Effect`]s.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::effect::Effect;
use crate::error::ModerationError;
use crate::model::{Report, ReportId, ReportStatus, ReviewVote, UserId, VoteTally};
use crate::notification::{ModerationEvent, ModerationEventKind, NewNotification};
use crate::quorum::{Outcome, QuorumPolicy};

/// A moderator's vote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCommand {
    pub report_id: ReportId,
    pub moderator: UserId,
    pub approve: bool,
}

impl VoteCommand {
    pub fn new(report_id: ReportId, moderator: impl Into<UserId>, approve: bool) -> Self {
        Self {
            report_id,
            moderator: moderator.into(),
            approve,
        }
    }
}

/// Committed state observed at the start of the vote transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteSnapshot {
    pub report: Option<Report>,
    pub tally: VoteTally,
    pub already_voted: bool,
}

/// What the caller is told happened to the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    Pending,
    AiReviewed,
    Reviewed,
    Deleted,
}

impl VoteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AiReviewed => "ai_reviewed",
            Self::Reviewed => "reviewed",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for VoteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ReportStatus> for VoteOutcome {
    fn from(status: ReportStatus) -> Self {
        match status {
            ReportStatus::Pending => Self::Pending,
            ReportStatus::AiReviewed => Self::AiReviewed,
            ReportStatus::Reviewed => Self::Reviewed,
        }
    }
}

/// Result of a vote transition.
#[derive(Debug, Clone, PartialEq)]
pub struct VotePlan {
    pub outcome: VoteOutcome,
    /// Tally including this vote.
    pub tally: VoteTally,
    pub message: String,
    /// The report as it will be after commit (for a deleted report, as it was).
    pub report: Report,
    /// Writes to apply, in order.
    pub effects: Vec<Effect>,
}

/// Decide the outcome of `command` against `snapshot`.
///
/// Preconditions are checked in a fixed order: the report must exist, must
/// not be published yet, and the moderator must not have voted already.
pub fn plan_vote(
    snapshot: &VoteSnapshot,
    command: &VoteCommand,
    policy: &QuorumPolicy,
    now: DateTime<Utc>,
) -> Result<VotePlan, ModerationError> {
    let report = snapshot
        .report
        .as_ref()
        .ok_or(ModerationError::NotFound("report"))?;

    if report.status.is_finalized() {
        return Err(ModerationError::AlreadyFinalized);
    }

    if snapshot.already_voted {
        return Err(ModerationError::DuplicateVote);
    }

    let vote = ReviewVote::new(report.id, command.moderator.clone(), command.approve, now);
    let tally = snapshot.tally.with_vote(command.approve);

    let mut effects = vec![
        Effect::RecordVote { vote },
        Effect::LogEvent {
            event: audit_event(
                report,
                ModerationEventKind::VoteRecorded,
                serde_json::json!({
                    "moderator": command.moderator,
                    "approve": command.approve,
                }),
                now,
            ),
        },
    ];

    let plan = match policy.evaluate(tally) {
        Outcome::Rejected => {
            effects.push(Effect::Notify {
                notification: NewNotification::report_rejected(
                    report.submitter.clone(),
                    report.id,
                ),
            });
            effects.push(Effect::DeleteReport {
                report_id: report.id,
            });
            effects.push(Effect::LogEvent {
                event: audit_event(
                    report,
                    ModerationEventKind::Deleted,
                    serde_json::json!({ "rejections": tally.rejections }),
                    now,
                ),
            });
            VotePlan {
                outcome: VoteOutcome::Deleted,
                tally,
                message: format!(
                    "Alert {} has been deleted after {} rejections.",
                    report.id, tally.rejections
                ),
                report: report.clone(),
                effects,
            }
        }
        Outcome::Approved => {
            effects.push(Effect::MarkReviewed {
                report_id: report.id,
            });
            effects.push(Effect::Notify {
                notification: NewNotification::report_approved(
                    report.submitter.clone(),
                    report.id,
                ),
            });
            effects.push(Effect::LogEvent {
                event: audit_event(
                    report,
                    ModerationEventKind::Approved,
                    serde_json::json!({ "approvals": tally.approvals }),
                    now,
                ),
            });
            VotePlan {
                outcome: VoteOutcome::Reviewed,
                tally,
                message: format!(
                    "Alert {} has been approved with {} votes.",
                    report.id, tally.approvals
                ),
                report: Report {
                    status: ReportStatus::Reviewed,
                    ..report.clone()
                },
                effects,
            }
        }
        Outcome::Pending => VotePlan {
            outcome: report.status.into(),
            tally,
            message: "Vote recorded successfully.".to_string(),
            report: report.clone(),
            effects,
        },
    };

    Ok(plan)
}

fn audit_event(
    report: &Report,
    kind: ModerationEventKind,
    data: serde_json::Value,
    now: DateTime<Utc>,
) -> ModerationEvent {
    ModerationEvent {
        report_id: report.id,
        submitter: report.submitter.clone(),
        kind,
        data,
        recorded_at: now,
    }
}
