//! Notification rows. Every update is scoped by recipient.

use rusqlite::{params, Connection};
use uuid::Uuid;

use proxify_core::{Notification, UserId};

use super::{count_to_u64, millis_to_datetime, parse_uuid, sql_error};
use crate::repository::RepositoryError;

pub(super) fn insert_notification_sync(
    conn: &Connection,
    notification: &Notification,
) -> Result<(), RepositoryError> {
    let payload = serde_json::to_string(&notification.payload)
        .map_err(|e| RepositoryError::storage("serialize notification payload", e.to_string()))?;

    conn.execute(
        r#"
        INSERT INTO notifications (id, recipient, title, message, category, payload, is_read, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            notification.id.to_string(),
            notification.recipient.as_str(),
            notification.title,
            notification.message,
            notification.category.as_str(),
            payload,
            notification.read,
            notification.created_at.timestamp_millis(),
        ],
    )
    .map_err(|e| sql_error("insert_notification", e))?;

    Ok(())
}

pub(super) fn list_notifications_sync(
    conn: &Connection,
    recipient: &UserId,
    unread_only: bool,
) -> Result<Vec<Notification>, RepositoryError> {
    let sql = if unread_only {
        r#"
        SELECT id, title, message, category, payload, is_read, created_at
        FROM notifications
        WHERE recipient = ?1 AND is_read = 0
        ORDER BY created_at ASC, rowid ASC
        "#
    } else {
        r#"
        SELECT id, title, message, category, payload, is_read, created_at
        FROM notifications
        WHERE recipient = ?1
        ORDER BY created_at ASC, rowid ASC
        "#
    };

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| sql_error("prepare list_notifications", e))?;

    let rows = stmt
        .query_map(params![recipient.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })
        .map_err(|e| sql_error("list_notifications", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| sql_error("read notification row", e))?;

    rows.into_iter()
        .map(|(id, title, message, category, payload, read, created_at)| {
            Ok(Notification {
                id: parse_uuid(&id, "notification")?,
                recipient: recipient.clone(),
                title,
                message,
                category: category.parse().map_err(RepositoryError::corruption)?,
                payload: serde_json::from_str(&payload)
                    .map_err(|_| RepositoryError::corruption("notification payload"))?,
                read,
                created_at: millis_to_datetime(created_at, "notification")?,
            })
        })
        .collect()
}

pub(super) fn unread_count_sync(
    conn: &Connection,
    recipient: &UserId,
) -> Result<u64, RepositoryError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM notifications WHERE recipient = ?1 AND is_read = 0",
            params![recipient.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| sql_error("unread_count", e))?;

    count_to_u64(count, "unread")
}

pub(super) fn mark_read_sync(
    conn: &Connection,
    recipient: &UserId,
    id: &Uuid,
) -> Result<bool, RepositoryError> {
    let changed = conn
        .execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient = ?2",
            params![id.to_string(), recipient.as_str()],
        )
        .map_err(|e| sql_error("mark_notification_read", e))?;

    Ok(changed > 0)
}

pub(super) fn mark_all_read_sync(
    conn: &Connection,
    recipient: &UserId,
) -> Result<u64, RepositoryError> {
    let changed = conn
        .execute(
            "UPDATE notifications SET is_read = 1 WHERE recipient = ?1 AND is_read = 0",
            params![recipient.as_str()],
        )
        .map_err(|e| sql_error("mark_all_read", e))?;

    Ok(changed as u64)
}

pub(super) fn delete_notification_sync(
    conn: &Connection,
    recipient: &UserId,
    id: &Uuid,
) -> Result<bool, RepositoryError> {
    let changed = conn
        .execute(
            "DELETE FROM notifications WHERE id = ?1 AND recipient = ?2",
            params![id.to_string(), recipient.as_str()],
        )
        .map_err(|e| sql_error("delete_notification", e))?;

    Ok(changed > 0)
}
