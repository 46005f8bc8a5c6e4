//! Notification inbox for end users.
//!
//! Moderation outcomes are written by the vote transaction itself; this type
//! covers standalone notifications and the recipient-facing operations.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use proxify_core::{ModerationError, NewNotification, Notification, UserId};

use crate::lifecycle::log_failure;
use crate::repository::ReportRepository;

pub struct NotificationEmitter {
    repository: Arc<dyn ReportRepository>,
}

impl NotificationEmitter {
    pub fn new(repository: Arc<dyn ReportRepository>) -> Self {
        Self { repository }
    }

    /// Store a notification outside of any vote transaction.
    pub async fn notify(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, ModerationError> {
        let notification = notification.into_notification(Utc::now());
        self.repository
            .insert_notification(&notification)
            .await
            .map_err(|e| log_failure("notify", e))?;
        debug!(
            recipient = %notification.recipient,
            id = %notification.id,
            "Stored notification"
        );
        Ok(notification)
    }

    pub async fn list(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, ModerationError> {
        self.repository
            .list_notifications(recipient, unread_only)
            .await
            .map_err(|e| log_failure("list_notifications", e))
    }

    pub async fn unread_count(&self, recipient: &UserId) -> Result<u64, ModerationError> {
        self.repository
            .unread_count(recipient)
            .await
            .map_err(|e| log_failure("unread_count", e))
    }

    /// Marking someone else's notification is indistinguishable from a
    /// missing one.
    pub async fn mark_read(&self, recipient: &UserId, id: &Uuid) -> Result<(), ModerationError> {
        let marked = self
            .repository
            .mark_notification_read(recipient, id)
            .await
            .map_err(|e| log_failure("mark_read", e))?;
        if marked {
            Ok(())
        } else {
            Err(ModerationError::NotFound("notification"))
        }
    }

    pub async fn mark_all_read(&self, recipient: &UserId) -> Result<u64, ModerationError> {
        self.repository
            .mark_all_read(recipient)
            .await
            .map_err(|e| log_failure("mark_all_read", e))
    }

    pub async fn delete(&self, recipient: &UserId, id: &Uuid) -> Result<(), ModerationError> {
        let deleted = self
            .repository
            .delete_notification(recipient, id)
            .await
            .map_err(|e| log_failure("delete_notification", e))?;
        if deleted {
            Ok(())
        } else {
            Err(ModerationError::NotFound("notification"))
        }
    }
}
