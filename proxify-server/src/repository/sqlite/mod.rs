//! SQLite implementation of `ReportRepository`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Vote transactions
//!
//! `commit_vote` runs in a `BEGIN IMMEDIATE` transaction: the write lock is
//! taken before the snapshot is read, so the tally and status the transition
//! sees cannot change underneath it. The `UNIQUE (report_id, moderator)`
//! constraint on `review_votes` is the final word on duplicate votes.

mod notifications;
mod reports;
mod votes;


use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use proxify_core::{
    plan_vote, ModerationError, ModerationEvent, Notification, QuorumPolicy, Report, ReportId,
    ReportStatus, ReviewVote, SubmitterStats, UserId, VoteCommand, VotePlan, VoteTally,
};

use super::{ReportQuery, ReportRepository, RepositoryError};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
pub(super) const CURRENT_SCHEMA_VERSION: i64 = 2;

/// SQLite-backed report repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    /// Exposed as `pub(crate)` for tests that inspect raw rows.
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Create a new SQLite repository at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    /// Runs any pending migrations if the database exists but has an older schema.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` for maximum durability (survives OS/power failure)
    /// - `busy_timeout = 5000ms` to handle concurrent access gracefully
    /// - `foreign_keys = ON` so deleting a report cascades to its votes
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();

        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";
        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // The database holds user content and moderator identities.
        #[cfg(unix)]
        if !is_in_memory && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        // SQLite can silently keep DELETE mode on filesystems without shared
        // memory support. In-memory databases report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'.",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // 0 if the table is empty (fresh database)
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        // Version 0 (fresh database) to version 1: reports, votes, notifications
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS reports (
                    id TEXT PRIMARY KEY,
                    submitter TEXT NOT NULL,
                    description TEXT NOT NULL,
                    category TEXT NOT NULL,
                    latitude REAL NOT NULL,
                    longitude REAL NOT NULL,
                    severity INTEGER NOT NULL CHECK (severity BETWEEN 1 AND 5),
                    attachments TEXT NOT NULL DEFAULT '[]',
                    status TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'ai_reviewed', 'reviewed')),
                    created_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_reports_status
                    ON reports(status, created_at);
                CREATE INDEX IF NOT EXISTS idx_reports_submitter
                    ON reports(submitter, created_at);

                CREATE TABLE IF NOT EXISTS review_votes (
                    id TEXT PRIMARY KEY,
                    report_id TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
                    moderator TEXT NOT NULL,
                    approve INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    UNIQUE (report_id, moderator)
                );

                CREATE TABLE IF NOT EXISTS notifications (
                    id TEXT PRIMARY KEY,
                    recipient TEXT NOT NULL,
                    title TEXT NOT NULL,
                    message TEXT NOT NULL,
                    category TEXT NOT NULL,
                    payload TEXT NOT NULL DEFAULT '{}',
                    is_read INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_notifications_recipient
                    ON notifications(recipient, created_at);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // Version 1 to version 2: moderation audit log. No foreign key to
        // reports, so entries survive report deletion.
        if from_version < 2 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS moderation_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    report_id TEXT NOT NULL,
                    submitter TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    data TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_moderation_events_report
                    ON moderation_events(report_id, recorded_at);
                CREATE INDEX IF NOT EXISTS idx_moderation_events_submitter
                    ON moderation_events(submitter, kind);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v2", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

// =============================================================================
// Conversion helpers
// =============================================================================

/// Map a rusqlite error, classifying lock contention as a retryable conflict.
pub(super) fn sql_error(operation: &'static str, e: rusqlite::Error) -> RepositoryError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
            return RepositoryError::Conflict { operation };
        }
    }
    RepositoryError::storage(operation, e.to_string())
}

/// Extended result code of a constraint violation, if `e` is one.
pub(super) fn constraint_code(e: &rusqlite::Error) -> Option<i32> {
    match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            Some(err.extended_code)
        }
        _ => None,
    }
}

pub(super) fn millis_to_datetime(
    millis: i64,
    what: &'static str,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| RepositoryError::corruption(format!("{} timestamp {}", what, millis)))
}

/// Convert a SQLite count to u64. Negative counts indicate corruption.
pub(super) fn count_to_u64(value: i64, what: &'static str) -> Result<u64, RepositoryError> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::corruption(format!("negative {} count {}", what, value)))
}

pub(super) fn parse_uuid(value: &str, what: &'static str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(value).map_err(|_| RepositoryError::corruption(format!("{} id", what)))
}

// =============================================================================
// ReportRepository trait implementation
// =============================================================================

#[async_trait]
impl ReportRepository for SqliteRepository {
    async fn insert_report(&self, report: &Report) -> Result<(), RepositoryError> {
        let report = report.clone();
        self.with_conn("insert_report", move |conn| {
            reports::insert_report_sync(conn, &report)
        })
        .await
    }

    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>, RepositoryError> {
        let id = *id;
        self.with_conn("get_report", move |conn| reports::get_report_sync(conn, &id))
            .await
    }

    async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<Report>, RepositoryError> {
        let query = query.clone();
        self.with_conn("list_reports", move |conn| {
            reports::list_reports_sync(conn, &query)
        })
        .await
    }

    async fn transition_status(
        &self,
        id: &ReportId,
        from: ReportStatus,
        to: ReportStatus,
    ) -> Result<bool, RepositoryError> {
        let id = *id;
        self.with_conn("transition_status", move |conn| {
            reports::transition_status_sync(conn, &id, from, to)
        })
        .await
    }

    async fn submitter_stats(&self, submitter: &UserId) -> Result<SubmitterStats, RepositoryError> {
        let submitter = submitter.clone();
        self.with_conn("submitter_stats", move |conn| {
            reports::submitter_stats_sync(conn, &submitter)
        })
        .await
    }

    async fn record_vote(&self, vote: &ReviewVote) -> Result<(), RepositoryError> {
        let vote = vote.clone();
        self.with_conn("record_vote", move |conn| votes::insert_vote_sync(conn, &vote))
            .await
    }

    async fn count_votes(&self, report_id: &ReportId) -> Result<VoteTally, RepositoryError> {
        let report_id = *report_id;
        self.with_conn("count_votes", move |conn| {
            votes::count_votes_sync(conn, &report_id)
        })
        .await
    }

    async fn has_voted(
        &self,
        report_id: &ReportId,
        moderator: &UserId,
    ) -> Result<bool, RepositoryError> {
        let report_id = *report_id;
        let moderator = moderator.clone();
        self.with_conn("has_voted", move |conn| {
            votes::has_voted_sync(conn, &report_id, &moderator)
        })
        .await
    }

    async fn list_votes(&self, report_id: &ReportId) -> Result<Vec<ReviewVote>, RepositoryError> {
        let report_id = *report_id;
        self.with_conn("list_votes", move |conn| {
            votes::list_votes_sync(conn, &report_id)
        })
        .await
    }

    async fn commit_vote(
        &self,
        command: &VoteCommand,
        policy: &QuorumPolicy,
    ) -> Result<VotePlan, ModerationError> {
        let conn = self.conn.clone();
        let command = command.clone();
        let policy = *policy;

        tokio::task::spawn_blocking(move || -> Result<VotePlan, ModerationError> {
            let mut conn = conn.lock().map_err(|_| {
                RepositoryError::storage("commit_vote", "connection mutex poisoned")
            })?;

            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| sql_error("begin vote transaction", e))?;

            let snapshot = votes::snapshot_sync(&tx, &command)?;
            // On a precondition failure `tx` is dropped, which rolls back.
            let plan = plan_vote(&snapshot, &command, &policy, Utc::now())?;

            for effect in &plan.effects {
                debug!(effect = effect.name(), report_id = %command.report_id, "applying effect");
                votes::apply_effect_sync(&tx, effect)?;
            }

            tx.commit()
                .map_err(|e| sql_error("commit vote transaction", e))?;

            Ok(plan)
        })
        .await
        .map_err(|e| ModerationError::StoreUnavailable(format!("vote task failed: {}", e)))?
    }

    async fn insert_notification(
        &self,
        notification: &Notification,
    ) -> Result<(), RepositoryError> {
        let notification = notification.clone();
        self.with_conn("insert_notification", move |conn| {
            notifications::insert_notification_sync(conn, &notification)
        })
        .await
    }

    async fn list_notifications(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let recipient = recipient.clone();
        self.with_conn("list_notifications", move |conn| {
            notifications::list_notifications_sync(conn, &recipient, unread_only)
        })
        .await
    }

    async fn unread_count(&self, recipient: &UserId) -> Result<u64, RepositoryError> {
        let recipient = recipient.clone();
        self.with_conn("unread_count", move |conn| {
            notifications::unread_count_sync(conn, &recipient)
        })
        .await
    }

    async fn mark_notification_read(
        &self,
        recipient: &UserId,
        id: &Uuid,
    ) -> Result<bool, RepositoryError> {
        let recipient = recipient.clone();
        let id = *id;
        self.with_conn("mark_notification_read", move |conn| {
            notifications::mark_read_sync(conn, &recipient, &id)
        })
        .await
    }

    async fn mark_all_read(&self, recipient: &UserId) -> Result<u64, RepositoryError> {
        let recipient = recipient.clone();
        self.with_conn("mark_all_read", move |conn| {
            notifications::mark_all_read_sync(conn, &recipient)
        })
        .await
    }

    async fn delete_notification(
        &self,
        recipient: &UserId,
        id: &Uuid,
    ) -> Result<bool, RepositoryError> {
        let recipient = recipient.clone();
        let id = *id;
        self.with_conn("delete_notification", move |conn| {
            notifications::delete_notification_sync(conn, &recipient, &id)
        })
        .await
    }

    async fn list_events(
        &self,
        report_id: &ReportId,
    ) -> Result<Vec<ModerationEvent>, RepositoryError> {
        let report_id = *report_id;
        self.with_conn("list_events", move |conn| {
            votes::list_events_sync(conn, &report_id)
        })
        .await
    }
}
