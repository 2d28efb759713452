/// Notification outbox entities
///
/// Services never send email directly. They enqueue a durable record
/// in the `notifications` collection in the same logical operation as
/// the triggering write, and the worker drains the collection. Each
/// record carries everything needed to render the message, so the
/// worker never has to re-read projects or tasks.
///
/// Delivery is at-least-once: a crash between send and the status
/// update re-sends on the next cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::entities::invitation::InviteRole;
use crate::entities::task::TaskPriority;
use crate::error::StoreError;
use crate::store::{collections, Record};

/// The kinds of email this system sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Invitation,
    TaskAssignment,
    TaskCompletion,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Invitation => "invitation",
            NotificationKind::TaskAssignment => "task_assignment",
            NotificationKind::TaskCompletion => "task_completion",
        }
    }
}

/// Delivery state of an outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

/// The self-contained message payload, one variant per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    #[serde(rename_all = "camelCase")]
    Invitation {
        invited_to_email: String,
        invited_by_email: String,
        project_name: String,
        role: InviteRole,
        project_id: String,
    },

    #[serde(rename_all = "camelCase")]
    TaskAssignment {
        assignee_email: String,
        task_title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_description: Option<String>,
        project_name: String,
        created_by_email: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<TaskPriority>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_date: Option<DateTime<Utc>>,
        project_id: String,
    },

    #[serde(rename_all = "camelCase")]
    TaskCompletion {
        owner_email: String,
        task_title: String,
        project_name: String,
        completed_by_email: String,
        project_id: String,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationPayload::Invitation { .. } => NotificationKind::Invitation,
            NotificationPayload::TaskAssignment { .. } => NotificationKind::TaskAssignment,
            NotificationPayload::TaskCompletion { .. } => NotificationKind::TaskCompletion,
        }
    }

    /// Who the rendered email is addressed to.
    pub fn recipient_email(&self) -> &str {
        match self {
            NotificationPayload::Invitation { invited_to_email, .. } => invited_to_email,
            NotificationPayload::TaskAssignment { assignee_email, .. } => assignee_email,
            NotificationPayload::TaskCompletion { owner_email, .. } => owner_email,
        }
    }
}

// Wire shape of a `notifications/{id}` document body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationDoc {
    #[serde(flatten)]
    payload: NotificationPayload,
    status: NotificationStatus,
    #[serde(default)]
    attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

/// A durable outbox record as read back from the store. Keeps the
/// envelope version so the worker can claim records with CAS.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub version: u64,
    pub payload: NotificationPayload,
    pub status: NotificationStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_record(record: &Record) -> Result<Self, StoreError> {
        let doc: NotificationDoc =
            serde_json::from_value(record.data.clone()).map_err(|e| StoreError::Malformed {
                collection: collections::NOTIFICATIONS.to_string(),
                id: record.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Notification {
            id: record.id.clone(),
            version: record.version,
            payload: doc.payload,
            status: doc.status,
            attempts: doc.attempts,
            last_error: doc.last_error,
            created_at: record.created_at.to_datetime(),
            updated_at: record.updated_at.to_datetime(),
        })
    }

    /// Builds the document body for a freshly enqueued notification.
    pub fn pending_doc(payload: NotificationPayload) -> JsonValue {
        json!(NotificationDoc {
            payload,
            status: NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Timestamp;

    fn invitation_payload() -> NotificationPayload {
        NotificationPayload::Invitation {
            invited_to_email: "buzz@example.com".to_string(),
            invited_by_email: "neil@example.com".to_string(),
            project_name: "Apollo".to_string(),
            role: InviteRole::Member,
            project_id: "p1".to_string(),
        }
    }

    #[test]
    fn test_pending_doc_shape() {
        let doc = Notification::pending_doc(invitation_payload());
        assert_eq!(doc["kind"], "invitation");
        assert_eq!(doc["status"], "pending");
        assert_eq!(doc["attempts"], 0);
        assert_eq!(doc["invitedToEmail"], "buzz@example.com");
    }

    #[test]
    fn test_recipient_per_kind() {
        assert_eq!(invitation_payload().recipient_email(), "buzz@example.com");

        let assignment = NotificationPayload::TaskAssignment {
            assignee_email: "a@b.c".to_string(),
            task_title: "t".to_string(),
            task_description: None,
            project_name: "p".to_string(),
            created_by_email: "c@b.c".to_string(),
            priority: None,
            due_date: None,
            project_id: "p1".to_string(),
        };
        assert_eq!(assignment.recipient_email(), "a@b.c");
        assert_eq!(assignment.kind(), NotificationKind::TaskAssignment);
    }

    #[test]
    fn test_from_record_round_trip() {
        let record = Record {
            id: "n1".to_string(),
            version: 3,
            created_at: Timestamp { seconds: 1, nanos: 0 },
            updated_at: Timestamp { seconds: 2, nanos: 0 },
            data: Notification::pending_doc(invitation_payload()),
        };
        let notification = Notification::from_record(&record).unwrap();
        assert_eq!(notification.version, 3);
        assert_eq!(notification.status, NotificationStatus::Pending);
        assert_eq!(notification.payload, invitation_payload());
        assert_eq!(notification.attempts, 0);
    }
}
