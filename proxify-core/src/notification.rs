//! Notification and audit-event records produced by moderation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ReportId, UserId};

/// Kind of notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// Proximity fan-out about nearby alerts.
    Alert,
    /// Outcome of a moderation decision.
    Admin,
    System,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alert" => Ok(Self::Alert),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            other => Err(format!("unknown notification category '{}'", other)),
        }
    }
}

/// A durable, per-user notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: UserId,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    pub payload: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub recipient: UserId,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    pub payload: serde_json::Value,
}

impl NewNotification {
    /// Always a fresh unread record; there is no deduplication.
    pub fn into_notification(self, now: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient: self.recipient,
            title: self.title,
            message: self.message,
            category: self.category,
            payload: self.payload,
            read: false,
            created_at: now,
        }
    }

    /// Tell the submitter their report was published.
    pub fn report_approved(submitter: UserId, report_id: ReportId) -> Self {
        Self {
            recipient: submitter,
            title: "Alert Approved".to_string(),
            message: "Your alert has been approved by moderators and is now visible to others."
                .to_string(),
            category: NotificationCategory::Admin,
            payload: serde_json::json!({
                "alert_id": report_id,
                "status": "reviewed",
            }),
        }
    }

    /// Tell the submitter their report was rejected and removed.
    pub fn report_rejected(submitter: UserId, report_id: ReportId) -> Self {
        Self {
            recipient: submitter,
            title: "Alert Rejected".to_string(),
            message: "Your alert was rejected by moderators and has been removed.".to_string(),
            category: NotificationCategory::Admin,
            payload: serde_json::json!({
                "alert_id": report_id,
                "status": "deleted",
            }),
        }
    }
}

/// Kind of entry in the moderation audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationEventKind {
    VoteRecorded,
    Approved,
    Deleted,
}

impl ModerationEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VoteRecorded => "vote_recorded",
            Self::Approved => "approved",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for ModerationEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vote_recorded" => Ok(Self::VoteRecorded),
            "approved" => Ok(Self::Approved),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown moderation event kind '{}'", other)),
        }
    }
}

/// Audit entry. Outlives the report it refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationEvent {
    pub report_id: ReportId,
    pub submitter: UserId,
    pub kind: ModerationEventKind,
    pub data: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_notifications_are_unread() {
        let n = NewNotification::report_approved(UserId::from("u"), ReportId::new())
            .into_notification(Utc::now());
        assert!(!n.read);
        assert_eq!(n.title, "Alert Approved");
        assert!(n.message.contains("approved"));
    }

    #[test]
    fn test_repeated_conversion_yields_distinct_ids() {
        let new = NewNotification::report_rejected(UserId::from("u"), ReportId::new());
        let a = new.clone().into_notification(Utc::now());
        let b = new.into_notification(Utc::now());
        assert_ne!(a.id, b.id);
        assert_eq!(a.title, "Alert Rejected");
    }

    #[test]
    fn test_payload_carries_report_id() {
        let report_id = ReportId::new();
        let n = NewNotification::report_rejected(UserId::from("u"), report_id);
        assert_eq!(n.payload["alert_id"], serde_json::json!(report_id.0));
        assert_eq!(n.payload["status"], "deleted");
    }
}
