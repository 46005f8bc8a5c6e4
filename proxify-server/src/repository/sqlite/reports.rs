//! Report rows.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use proxify_core::{Location, Report, ReportId, ReportStatus, SubmitterStats, UserId};

use super::{count_to_u64, millis_to_datetime, parse_uuid, sql_error};
use crate::repository::{ReportQuery, RepositoryError, SortOrder};

const REPORT_COLUMNS: &str = "id, submitter, description, category, latitude, longitude, \
                              severity, attachments, status, created_at";

/// Raw column values, decoded after the statement finishes so that a corrupt
/// row surfaces as `RepositoryError::Corruption` rather than a rusqlite error.
struct ReportRow {
    id: String,
    submitter: String,
    description: String,
    category: String,
    latitude: f64,
    longitude: f64,
    severity: i64,
    attachments: String,
    status: String,
    created_at: i64,
}

impl ReportRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            submitter: row.get(1)?,
            description: row.get(2)?,
            category: row.get(3)?,
            latitude: row.get(4)?,
            longitude: row.get(5)?,
            severity: row.get(6)?,
            attachments: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_report(self) -> Result<Report, RepositoryError> {
        let id = ReportId(parse_uuid(&self.id, "report")?);
        let category = self
            .category
            .parse()
            .map_err(|_| RepositoryError::corruption(format!("category of report {}", id)))?;
        let status = self
            .status
            .parse()
            .map_err(|_| RepositoryError::corruption(format!("status of report {}", id)))?;
        let severity = u8::try_from(self.severity)
            .map_err(|_| RepositoryError::corruption(format!("severity of report {}", id)))?;
        let attachments = serde_json::from_str(&self.attachments)
            .map_err(|_| RepositoryError::corruption(format!("attachments of report {}", id)))?;

        Ok(Report {
            id,
            submitter: UserId(self.submitter),
            description: self.description,
            category,
            location: Location::new(self.latitude, self.longitude),
            severity,
            attachments,
            status,
            created_at: millis_to_datetime(self.created_at, "report")?,
        })
    }
}

pub(super) fn insert_report_sync(conn: &Connection, report: &Report) -> Result<(), RepositoryError> {
    let attachments = serde_json::to_string(&report.attachments)
        .map_err(|e| RepositoryError::storage("serialize attachments", e.to_string()))?;

    conn.execute(
        &format!(
            "INSERT INTO reports ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            REPORT_COLUMNS
        ),
        params![
            report.id.to_string(),
            report.submitter.as_str(),
            report.description,
            report.category.as_str(),
            report.location.latitude,
            report.location.longitude,
            report.severity,
            attachments,
            report.status.as_str(),
            report.created_at.timestamp_millis(),
        ],
    )
    .map_err(|e| sql_error("insert_report", e))?;

    Ok(())
}

pub(super) fn get_report_sync(
    conn: &Connection,
    id: &ReportId,
) -> Result<Option<Report>, RepositoryError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM reports WHERE id = ?1", REPORT_COLUMNS),
            params![id.to_string()],
            ReportRow::from_row,
        )
        .optional()
        .map_err(|e| sql_error("get_report", e))?;

    row.map(ReportRow::into_report).transpose()
}

pub(super) fn list_reports_sync(
    conn: &Connection,
    query: &ReportQuery,
) -> Result<Vec<Report>, RepositoryError> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(submitter) = &query.submitter {
        values.push(Value::Text(submitter.as_str().to_string()));
        clauses.push(format!("submitter = ?{}", values.len()));
    }

    if !query.statuses.is_empty() {
        let mut placeholders = Vec::with_capacity(query.statuses.len());
        for status in &query.statuses {
            values.push(Value::Text(status.as_str().to_string()));
            placeholders.push(format!("?{}", values.len()));
        }
        clauses.push(format!("status IN ({})", placeholders.join(", ")));
    }

    let mut sql = format!("SELECT {} FROM reports", REPORT_COLUMNS);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    sql.push_str(match query.order {
        SortOrder::OldestFirst => " ORDER BY created_at ASC, rowid ASC",
        SortOrder::NewestFirst => " ORDER BY created_at DESC, rowid DESC",
    });

    if let Some(limit) = query.limit {
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        sql.push_str(&format!(" LIMIT ?{}", values.len()));
    }

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| sql_error("prepare list_reports", e))?;

    let rows = stmt
        .query_map(params_from_iter(values.iter()), ReportRow::from_row)
        .map_err(|e| sql_error("list_reports", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| sql_error("read report row", e))?;

    rows.into_iter().map(ReportRow::into_report).collect()
}

pub(super) fn transition_status_sync(
    conn: &Connection,
    id: &ReportId,
    from: ReportStatus,
    to: ReportStatus,
) -> Result<bool, RepositoryError> {
    let changed = conn
        .execute(
            "UPDATE reports SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![to.as_str(), id.to_string(), from.as_str()],
        )
        .map_err(|e| sql_error("transition_status", e))?;

    Ok(changed > 0)
}

pub(super) fn mark_reviewed_sync(conn: &Connection, id: &ReportId) -> Result<(), RepositoryError> {
    conn.execute(
        "UPDATE reports SET status = ?1 WHERE id = ?2",
        params![ReportStatus::Reviewed.as_str(), id.to_string()],
    )
    .map_err(|e| sql_error("mark_reviewed", e))?;

    Ok(())
}

/// Deleting the report cascades to its votes through the foreign key.
pub(super) fn delete_report_sync(conn: &Connection, id: &ReportId) -> Result<(), RepositoryError> {
    conn.execute("DELETE FROM reports WHERE id = ?1", params![id.to_string()])
        .map_err(|e| sql_error("delete_report", e))?;

    Ok(())
}

pub(super) fn submitter_stats_sync(
    conn: &Connection,
    submitter: &UserId,
) -> Result<SubmitterStats, RepositoryError> {
    let (total, pending, approved): (i64, i64, i64) = conn
        .query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(status IN ('pending', 'ai_reviewed')), 0),
                   COALESCE(SUM(status = 'reviewed'), 0)
            FROM reports
            WHERE submitter = ?1
            "#,
            params![submitter.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .map_err(|e| sql_error("submitter_stats", e))?;

    let rejected: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM moderation_events WHERE submitter = ?1 AND kind = 'deleted'",
            params![submitter.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| sql_error("count rejected reports", e))?;

    Ok(SubmitterStats {
        total: count_to_u64(total, "report")?,
        pending: count_to_u64(pending, "pending")?,
        approved: count_to_u64(approved, "approved")?,
        rejected: count_to_u64(rejected, "rejected")?,
    })
}
