//! Review votes, the vote snapshot and effect application.

use rusqlite::{ffi, params, Connection};

use proxify_core::{
    Effect, ModerationEvent, ReportId, ReviewVote, UserId, VoteCommand, VoteSnapshot, VoteTally,
};

use super::notifications::insert_notification_sync;
use super::reports::{delete_report_sync, get_report_sync, mark_reviewed_sync};
use super::{constraint_code, millis_to_datetime, parse_uuid, sql_error};
use crate::repository::RepositoryError;

/// Insert a vote, letting the schema decide uniqueness and existence.
pub(super) fn insert_vote_sync(conn: &Connection, vote: &ReviewVote) -> Result<(), RepositoryError> {
    conn.execute(
        r#"
        INSERT INTO review_votes (id, report_id, moderator, approve, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            vote.id.to_string(),
            vote.report_id.to_string(),
            vote.moderator.as_str(),
            vote.approve,
            vote.created_at.timestamp_millis(),
        ],
    )
    .map_err(|e| match constraint_code(&e) {
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => RepositoryError::DuplicateVote,
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => RepositoryError::MissingReport,
        _ => sql_error("record_vote", e),
    })?;

    Ok(())
}

pub(super) fn count_votes_sync(
    conn: &Connection,
    report_id: &ReportId,
) -> Result<VoteTally, RepositoryError> {
    let (approvals, rejections): (i64, i64) = conn
        .query_row(
            r#"
            SELECT COALESCE(SUM(approve = 1), 0), COALESCE(SUM(approve = 0), 0)
            FROM review_votes
            WHERE report_id = ?1
            "#,
            params![report_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|e| sql_error("count_votes", e))?;

    let approvals = u32::try_from(approvals)
        .map_err(|_| RepositoryError::corruption(format!("approval count {}", approvals)))?;
    let rejections = u32::try_from(rejections)
        .map_err(|_| RepositoryError::corruption(format!("rejection count {}", rejections)))?;

    Ok(VoteTally::new(approvals, rejections))
}

pub(super) fn has_voted_sync(
    conn: &Connection,
    report_id: &ReportId,
    moderator: &UserId,
) -> Result<bool, RepositoryError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM review_votes WHERE report_id = ?1 AND moderator = ?2)",
        params![report_id.to_string(), moderator.as_str()],
        |row| row.get(0),
    )
    .map_err(|e| sql_error("has_voted", e))
}

pub(super) fn list_votes_sync(
    conn: &Connection,
    report_id: &ReportId,
) -> Result<Vec<ReviewVote>, RepositoryError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, moderator, approve, created_at
            FROM review_votes
            WHERE report_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .map_err(|e| sql_error("prepare list_votes", e))?;

    let rows = stmt
        .query_map(params![report_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })
        .map_err(|e| sql_error("list_votes", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| sql_error("read vote row", e))?;

    rows.into_iter()
        .map(|(id, moderator, approve, created_at)| {
            Ok(ReviewVote {
                id: parse_uuid(&id, "vote")?,
                report_id: *report_id,
                moderator: UserId(moderator),
                approve,
                created_at: millis_to_datetime(created_at, "vote")?,
            })
        })
        .collect()
}

/// Everything the vote transition reads. Must run inside the vote transaction.
pub(super) fn snapshot_sync(
    conn: &Connection,
    command: &VoteCommand,
) -> Result<VoteSnapshot, RepositoryError> {
    Ok(VoteSnapshot {
        report: get_report_sync(conn, &command.report_id)?,
        tally: count_votes_sync(conn, &command.report_id)?,
        already_voted: has_voted_sync(conn, &command.report_id, &command.moderator)?,
    })
}

pub(super) fn apply_effect_sync(conn: &Connection, effect: &Effect) -> Result<(), RepositoryError> {
    match effect {
        Effect::RecordVote { vote } => insert_vote_sync(conn, vote),
        Effect::MarkReviewed { report_id } => mark_reviewed_sync(conn, report_id),
        Effect::DeleteReport { report_id } => delete_report_sync(conn, report_id),
        Effect::Notify { notification } => {
            let notification = notification.clone().into_notification(chrono::Utc::now());
            insert_notification_sync(conn, &notification)
        }
        Effect::LogEvent { event } => insert_event_sync(conn, event),
    }
}

fn insert_event_sync(conn: &Connection, event: &ModerationEvent) -> Result<(), RepositoryError> {
    let data = serde_json::to_string(&event.data)
        .map_err(|e| RepositoryError::storage("serialize event data", e.to_string()))?;

    conn.execute(
        r#"
        INSERT INTO moderation_events (report_id, submitter, kind, data, recorded_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            event.report_id.to_string(),
            event.submitter.as_str(),
            event.kind.as_str(),
            data,
            event.recorded_at.timestamp_millis(),
        ],
    )
    .map_err(|e| sql_error("log_event", e))?;

    Ok(())
}

pub(super) fn list_events_sync(
    conn: &Connection,
    report_id: &ReportId,
) -> Result<Vec<ModerationEvent>, RepositoryError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT submitter, kind, data, recorded_at
            FROM moderation_events
            WHERE report_id = ?1
            ORDER BY id ASC
            "#,
        )
        .map_err(|e| sql_error("prepare list_events", e))?;

    let rows = stmt
        .query_map(params![report_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })
        .map_err(|e| sql_error("list_events", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| sql_error("read event row", e))?;

    rows.into_iter()
        .map(|(submitter, kind, data, recorded_at)| {
            Ok(ModerationEvent {
                report_id: *report_id,
                submitter: UserId(submitter),
                kind: kind.parse().map_err(RepositoryError::corruption)?,
                data: serde_json::from_str(&data)
                    .map_err(|_| RepositoryError::corruption("moderation event data"))?,
                recorded_at: millis_to_datetime(recorded_at, "moderation event")?,
            })
        })
        .collect()
}
