//! Report lifecycle: creation, moderation votes and read paths.
//!
//! The decision for a vote is made by [`proxify_core::plan_vote`] inside the
//! repository's transaction. This layer adds authorization, the single retry
//! on write conflicts and the post-commit hand-off to the location indexer.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use proxify_core::{
    ModerationError, NewReport, QuorumPolicy, Report, ReportId, ReportStatus, ReviewVote,
    SubmitterStats, UserId, VoteCommand, VoteOutcome, VotePlan, VoteTally,
};

use crate::identity::Caller;
use crate::indexer::LocationIndexer;
use crate::repository::{ReportQuery, ReportRepository};

/// Page size for published reports when the caller does not ask for one.
pub const DEFAULT_APPROVED_LIMIT: usize = 50;

/// Largest page of published reports a caller may request.
pub const MAX_APPROVED_LIMIT: usize = 200;

/// Log infrastructure failures as they leave the service layer. Caller-side
/// errors pass through silently.
pub(crate) fn log_failure(
    operation: &'static str,
    err: impl Into<ModerationError>,
) -> ModerationError {
    let err = err.into();
    if !err.is_client_error() {
        error!(operation, "Moderation store failure: {}", err);
    }
    err
}

/// What a moderator is told after voting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteReceipt {
    pub report_id: ReportId,
    /// Status after the vote, or `deleted`.
    pub outcome: VoteOutcome,
    pub message: String,
    /// Tally including this vote.
    pub tally: VoteTally,
}

/// Votes cast so far on a report awaiting review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteDetails {
    pub report_id: ReportId,
    pub status: ReportStatus,
    pub tally: VoteTally,
    pub votes: Vec<ReviewVote>,
}

pub struct ReportLifecycle {
    repository: Arc<dyn ReportRepository>,
    indexer: Arc<dyn LocationIndexer>,
    policy: QuorumPolicy,
}

impl ReportLifecycle {
    pub fn new(
        repository: Arc<dyn ReportRepository>,
        indexer: Arc<dyn LocationIndexer>,
        policy: QuorumPolicy,
    ) -> Self {
        Self {
            repository,
            indexer,
            policy,
        }
    }

    /// Validate and store a new report in `pending` status.
    pub async fn create_report(
        &self,
        submitter: &UserId,
        new_report: NewReport,
    ) -> Result<Report, ModerationError> {
        let report = new_report.into_report(submitter.clone(), Utc::now())?;
        self.repository
            .insert_report(&report)
            .await
            .map_err(|e| log_failure("create_report", e))?;
        info!(
            report_id = %report.id,
            submitter = %report.submitter,
            category = report.category.as_str(),
            "Report submitted for moderation"
        );
        Ok(report)
    }

    /// Record a moderator's vote and apply any terminal transition it causes.
    ///
    /// The whole transaction is retried once if the store reports a write
    /// conflict. A second conflict is returned to the caller.
    pub async fn submit_vote(
        &self,
        caller: &Caller,
        report_id: ReportId,
        approve: bool,
    ) -> Result<VoteReceipt, ModerationError> {
        if !caller.is_moderator {
            return Err(ModerationError::Forbidden("only moderators may vote"));
        }

        let command = VoteCommand::new(report_id, caller.user_id.clone(), approve);

        let plan = match self.repository.commit_vote(&command, &self.policy).await {
            Err(e) if e.is_retryable() => {
                warn!(
                    report_id = %report_id,
                    moderator = %caller.user_id,
                    "Vote transaction conflicted, retrying once"
                );
                self.repository.commit_vote(&command, &self.policy).await
            }
            result => result,
        }
        .map_err(|e| log_failure("submit_vote", e))?;

        self.after_commit(&plan).await;

        Ok(VoteReceipt {
            report_id,
            outcome: plan.outcome,
            message: plan.message,
            tally: plan.tally,
        })
    }

    async fn after_commit(&self, plan: &VotePlan) {
        let report = &plan.report;
        match plan.outcome {
            VoteOutcome::Reviewed => {
                info!(
                    report_id = %report.id,
                    approvals = plan.tally.approvals,
                    rejections = plan.tally.rejections,
                    "Report approved"
                );
                if let Err(e) = self
                    .indexer
                    .index_approved(report.id, report.location)
                    .await
                {
                    warn!(
                        report_id = %report.id,
                        "Failed to index approved report location: {:#}",
                        e
                    );
                }
            }
            VoteOutcome::Deleted => {
                info!(
                    report_id = %report.id,
                    approvals = plan.tally.approvals,
                    rejections = plan.tally.rejections,
                    "Report rejected and deleted"
                );
            }
            VoteOutcome::Pending | VoteOutcome::AiReviewed => {
                debug!(
                    report_id = %report.id,
                    approvals = plan.tally.approvals,
                    rejections = plan.tally.rejections,
                    "Vote recorded"
                );
            }
        }
    }

    /// Reports awaiting a decision, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<Report>, ModerationError> {
        self.repository
            .list_reports(&ReportQuery::awaiting_review())
            .await
            .map_err(|e| log_failure("list_pending", e))
    }

    /// Unpublished reports are only visible to moderators and their submitter;
    /// anyone else gets `NotFound`.
    pub async fn get_report(
        &self,
        id: &ReportId,
        viewer: &Caller,
    ) -> Result<Report, ModerationError> {
        self.repository
            .get_report(id)
            .await
            .map_err(|e| log_failure("get_report", e))?
            .filter(|report| report.is_visible_to(&viewer.user_id, viewer.is_moderator))
            .ok_or(ModerationError::NotFound("report"))
    }

    /// Published reports, newest first.
    pub async fn list_approved(&self, limit: Option<usize>) -> Result<Vec<Report>, ModerationError> {
        let limit = limit
            .unwrap_or(DEFAULT_APPROVED_LIMIT)
            .min(MAX_APPROVED_LIMIT);
        self.repository
            .list_reports(&ReportQuery::published(limit))
            .await
            .map_err(|e| log_failure("list_approved", e))
    }

    pub async fn list_by_submitter(
        &self,
        submitter: &UserId,
        status: Option<ReportStatus>,
    ) -> Result<Vec<Report>, ModerationError> {
        self.repository
            .list_reports(&ReportQuery::by_submitter(submitter.clone(), status))
            .await
            .map_err(|e| log_failure("list_by_submitter", e))
    }

    pub async fn submitter_stats(
        &self,
        submitter: &UserId,
    ) -> Result<SubmitterStats, ModerationError> {
        self.repository
            .submitter_stats(submitter)
            .await
            .map_err(|e| log_failure("submitter_stats", e))
    }

    /// Record that the automated pre-screen has looked at a report.
    ///
    /// Only `pending` reports move. Repeating the call is a no-op, and a
    /// published report yields `AlreadyFinalized`.
    pub async fn mark_ai_reviewed(&self, id: &ReportId) -> Result<Report, ModerationError> {
        let moved = self
            .repository
            .transition_status(id, ReportStatus::Pending, ReportStatus::AiReviewed)
            .await
            .map_err(|e| log_failure("mark_ai_reviewed", e))?;

        let report = self
            .repository
            .get_report(id)
            .await
            .map_err(|e| log_failure("mark_ai_reviewed", e))?
            .ok_or(ModerationError::NotFound("report"))?;

        if moved {
            debug!(report_id = %id, "Report marked as AI-reviewed");
            return Ok(report);
        }

        match report.status {
            ReportStatus::Reviewed => Err(ModerationError::AlreadyFinalized),
            ReportStatus::Pending | ReportStatus::AiReviewed => Ok(report),
        }
    }

    /// Votes cast on a report that still exists.
    pub async fn vote_details(&self, id: &ReportId) -> Result<VoteDetails, ModerationError> {
        let report = self
            .repository
            .get_report(id)
            .await
            .map_err(|e| log_failure("vote_details", e))?
            .ok_or(ModerationError::NotFound("report"))?;

        let votes = self
            .repository
            .list_votes(id)
            .await
            .map_err(|e| log_failure("vote_details", e))?;
        let tally: VoteTally = votes.iter().collect();

        Ok(VoteDetails {
            report_id: report.id,
            status: report.status,
            tally,
            votes,
        })
    }
}
