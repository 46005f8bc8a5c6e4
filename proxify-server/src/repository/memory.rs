//! In-memory implementation of `ReportRepository`.
//!
//! All state is held in memory and lost on restart. Every table lives behind
//! one `RwLock`, and `commit_vote` holds the write guard across the whole
//! read-decide-apply sequence, which makes it serializable.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use proxify_core::{
    plan_vote, Effect, ModerationError, ModerationEvent, ModerationEventKind, Notification,
    QuorumPolicy, Report, ReportId, ReportStatus, ReviewVote, SubmitterStats, UserId, VoteCommand,
    VotePlan, VoteSnapshot, VoteTally,
};

use super::{ReportQuery, ReportRepository, RepositoryError, SortOrder};

/// Row wrapper carrying insertion order, used to break timestamp ties.
#[derive(Debug, Clone)]
struct Row<T> {
    seq: u64,
    value: T,
}

#[derive(Debug, Default)]
struct Tables {
    next_seq: u64,
    reports: HashMap<ReportId, Row<Report>>,
    /// Keyed by the unique (report, moderator) pair.
    votes: HashMap<(ReportId, UserId), Row<ReviewVote>>,
    notifications: HashMap<Uuid, Row<Notification>>,
    events: Vec<ModerationEvent>,
}

impl Tables {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn tally(&self, report_id: &ReportId) -> VoteTally {
        self.votes
            .values()
            .filter(|row| &row.value.report_id == report_id)
            .map(|row| &row.value)
            .collect()
    }

    fn insert_vote(&mut self, vote: &ReviewVote) -> Result<(), RepositoryError> {
        self.check_vote(vote)?;
        let seq = self.next_seq();
        self.votes.insert(
            (vote.report_id, vote.moderator.clone()),
            Row {
                seq,
                value: vote.clone(),
            },
        );
        Ok(())
    }

    fn check_vote(&self, vote: &ReviewVote) -> Result<(), RepositoryError> {
        if !self.reports.contains_key(&vote.report_id) {
            return Err(RepositoryError::MissingReport);
        }
        if self
            .votes
            .contains_key(&(vote.report_id, vote.moderator.clone()))
        {
            return Err(RepositoryError::DuplicateVote);
        }
        Ok(())
    }

    /// Reject the whole effect list before touching anything, so a failing
    /// effect cannot leave earlier ones applied.
    fn check_effects(&self, effects: &[Effect]) -> Result<(), RepositoryError> {
        for effect in effects {
            if let Effect::RecordVote { vote } = effect {
                self.check_vote(vote)?;
            }
        }
        Ok(())
    }

    fn apply(&mut self, effect: &Effect) -> Result<(), RepositoryError> {
        match effect {
            Effect::RecordVote { vote } => self.insert_vote(vote)?,
            Effect::MarkReviewed { report_id } => {
                if let Some(row) = self.reports.get_mut(report_id) {
                    row.value.status = ReportStatus::Reviewed;
                }
            }
            Effect::DeleteReport { report_id } => {
                self.reports.remove(report_id);
                self.votes.retain(|(id, _), _| id != report_id);
            }
            Effect::Notify { notification } => {
                let notification = notification.clone().into_notification(Utc::now());
                let seq = self.next_seq();
                self.notifications.insert(
                    notification.id,
                    Row {
                        seq,
                        value: notification,
                    },
                );
            }
            Effect::LogEvent { event } => self.events.push(event.clone()),
        }
        Ok(())
    }
}

/// In-memory report repository.
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportRepository for InMemoryRepository {
    async fn insert_report(&self, report: &Report) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.reports.contains_key(&report.id) {
            return Err(RepositoryError::storage(
                "insert_report",
                format!("report {} already exists", report.id),
            ));
        }
        let seq = tables.next_seq();
        tables.reports.insert(
            report.id,
            Row {
                seq,
                value: report.clone(),
            },
        );
        Ok(())
    }

    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.reports.get(id).map(|row| row.value.clone()))
    }

    async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<Report>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Row<Report>> = tables
            .reports
            .values()
            .filter(|row| query.matches(&row.value))
            .collect();

        rows.sort_by_key(|row| (row.value.created_at, row.seq));
        if query.order == SortOrder::NewestFirst {
            rows.reverse();
        }

        Ok(rows
            .into_iter()
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|row| row.value.clone())
            .collect())
    }

    async fn transition_status(
        &self,
        id: &ReportId,
        from: ReportStatus,
        to: ReportStatus,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.reports.get_mut(id) {
            Some(row) if row.value.status == from => {
                row.value.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn submitter_stats(&self, submitter: &UserId) -> Result<SubmitterStats, RepositoryError> {
        let tables = self.tables.read().await;
        let mut stats = SubmitterStats::default();

        for row in tables.reports.values() {
            if &row.value.submitter != submitter {
                continue;
            }
            stats.total += 1;
            match row.value.status {
                ReportStatus::Pending | ReportStatus::AiReviewed => stats.pending += 1,
                ReportStatus::Reviewed => stats.approved += 1,
            }
        }

        stats.rejected = tables
            .events
            .iter()
            .filter(|e| &e.submitter == submitter && e.kind == ModerationEventKind::Deleted)
            .count() as u64;

        Ok(stats)
    }

    async fn record_vote(&self, vote: &ReviewVote) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.insert_vote(vote)
    }

    async fn count_votes(&self, report_id: &ReportId) -> Result<VoteTally, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.tally(report_id))
    }

    async fn has_voted(
        &self,
        report_id: &ReportId,
        moderator: &UserId,
    ) -> Result<bool, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.votes.contains_key(&(*report_id, moderator.clone())))
    }

    async fn list_votes(&self, report_id: &ReportId) -> Result<Vec<ReviewVote>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Row<ReviewVote>> = tables
            .votes
            .values()
            .filter(|row| &row.value.report_id == report_id)
            .collect();
        rows.sort_by_key(|row| row.seq);
        Ok(rows.into_iter().map(|row| row.value.clone()).collect())
    }

    async fn commit_vote(
        &self,
        command: &VoteCommand,
        policy: &QuorumPolicy,
    ) -> Result<VotePlan, ModerationError> {
        let mut tables = self.tables.write().await;

        let snapshot = VoteSnapshot {
            report: tables
                .reports
                .get(&command.report_id)
                .map(|row| row.value.clone()),
            tally: tables.tally(&command.report_id),
            already_voted: tables
                .votes
                .contains_key(&(command.report_id, command.moderator.clone())),
        };

        let plan = plan_vote(&snapshot, command, policy, Utc::now())?;

        tables.check_effects(&plan.effects)?;
        for effect in &plan.effects {
            tables.apply(effect)?;
        }

        Ok(plan)
    }

    async fn insert_notification(
        &self,
        notification: &Notification,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let seq = tables.next_seq();
        tables.notifications.insert(
            notification.id,
            Row {
                seq,
                value: notification.clone(),
            },
        );
        Ok(())
    }

    async fn list_notifications(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Row<Notification>> = tables
            .notifications
            .values()
            .filter(|row| &row.value.recipient == recipient && !(unread_only && row.value.read))
            .collect();
        rows.sort_by_key(|row| (row.value.created_at, row.seq));
        Ok(rows.into_iter().map(|row| row.value.clone()).collect())
    }

    async fn unread_count(&self, recipient: &UserId) -> Result<u64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .values()
            .filter(|row| &row.value.recipient == recipient && !row.value.read)
            .count() as u64)
    }

    async fn mark_notification_read(
        &self,
        recipient: &UserId,
        id: &Uuid,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.notifications.get_mut(id) {
            Some(row) if &row.value.recipient == recipient => {
                row.value.read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, recipient: &UserId) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for row in tables.notifications.values_mut() {
            if &row.value.recipient == recipient && !row.value.read {
                row.value.read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_notification(
        &self,
        recipient: &UserId,
        id: &Uuid,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .notifications
            .get(id)
            .is_some_and(|row| &row.value.recipient == recipient);
        if owned {
            tables.notifications.remove(id);
        }
        Ok(owned)
    }

    async fn list_events(
        &self,
        report_id: &ReportId,
    ) -> Result<Vec<ModerationEvent>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| &e.report_id == report_id)
            .cloned()
            .collect())
    }
}
