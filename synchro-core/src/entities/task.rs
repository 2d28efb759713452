/// Task entities
///
/// Tasks are project-scoped and carry two assignee fields that must
/// stay consistent: `assignedTo` (a single uid kept for older readers)
/// and `assignedToUsers` (the full list). `assignedTo` always mirrors
/// the first entry of `assignedToUsers`; normalization happens here so
/// the service layer never has to reconcile the pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use validator::Validate;

use crate::error::StoreError;
use crate::store::{collections, Record};

/// Workflow state of a task. Stored as the human-readable column
/// names so documents stay legible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "To Do")]
    ToDo,
    #[serde(rename = "In Progress")]
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::ToDo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Review => "Review",
            TaskStatus::Done => "Done",
        }
    }
}

/// True exactly when a status change crosses into Done. Re-saving an
/// already-Done task does not count.
pub fn entered_done(prev: TaskStatus, next: TaskStatus) -> bool {
    next == TaskStatus::Done && prev != TaskStatus::Done
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

/// A task within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub estimated_hours: Option<f64>,
    pub assigned_to: Option<String>,
    pub assigned_to_users: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Wire shape of a `tasks/{id}` document body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDoc {
    project_id: String,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assigned_to: Option<String>,
    #[serde(default)]
    assigned_to_users: Vec<String>,
    created_by: String,
}

impl Task {
    /// Decodes a stored record, converting envelope timestamps.
    pub fn from_record(record: &Record) -> Result<Self, StoreError> {
        let doc: TaskDoc =
            serde_json::from_value(record.data.clone()).map_err(|e| StoreError::Malformed {
                collection: collections::TASKS.to_string(),
                id: record.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Task {
            id: record.id.clone(),
            project_id: doc.project_id,
            title: doc.title,
            description: doc.description,
            status: doc.status,
            priority: doc.priority,
            due_date: doc.due_date,
            category: doc.category,
            estimated_hours: doc.estimated_hours,
            assigned_to: doc.assigned_to,
            assigned_to_users: doc.assigned_to_users,
            created_by: doc.created_by,
            created_at: record.created_at.to_datetime(),
            updated_at: record.updated_at.to_datetime(),
        })
    }

    /// The effective assignee set: the list when non-empty, otherwise
    /// the single legacy field.
    pub fn assignees(&self) -> Vec<String> {
        if !self.assigned_to_users.is_empty() {
            self.assigned_to_users.clone()
        } else {
            self.assigned_to.iter().cloned().collect()
        }
    }

    /// True when `uid` is assigned via either field.
    pub fn is_assigned_to(&self, uid: &str) -> bool {
        self.assigned_to.as_deref() == Some(uid)
            || self.assigned_to_users.iter().any(|u| u == uid)
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Validate)]
pub struct CreateTask {
    pub project_id: String,

    #[validate(length(min = 1, max = 200))]
    pub title: String,

    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub estimated_hours: Option<f64>,
    pub assigned_to: Option<String>,
    pub assigned_to_users: Vec<String>,
    pub created_by: String,
}

impl CreateTask {
    /// Reconciles the two assignee fields: when the list is set it is
    /// authoritative and the single field mirrors its head; when only
    /// the single field is set it is mirrored into the list.
    pub(crate) fn normalized(mut self) -> Self {
        if !self.assigned_to_users.is_empty() {
            self.assigned_to = self.assigned_to_users.first().cloned();
        } else if let Some(uid) = &self.assigned_to {
            self.assigned_to_users = vec![uid.clone()];
        }
        self
    }

    pub(crate) fn into_doc(self) -> JsonValue {
        json!(TaskDoc {
            project_id: self.project_id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            due_date: self.due_date,
            category: self.category,
            estimated_hours: self.estimated_hours,
            assigned_to: self.assigned_to,
            assigned_to_users: self.assigned_to_users,
            created_by: self.created_by,
        })
    }
}

/// The closed set of legal partial updates to a task.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,

    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,

    pub status: Option<TaskStatus>,

    /// `Some(None)` clears the priority.
    pub priority: Option<Option<TaskPriority>>,

    /// `Some(None)` clears the due date.
    pub due_date: Option<Option<DateTime<Utc>>>,

    /// `Some(None)` clears the category.
    pub category: Option<Option<String>>,

    /// `Some(None)` clears the estimate.
    pub estimated_hours: Option<Option<f64>>,

    /// Setting this rewrites both assignee fields; an empty list
    /// unassigns everyone.
    pub assigned_to_users: Option<Vec<String>>,
}

impl TaskUpdate {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.category.is_none()
            && self.estimated_hours.is_none()
            && self.assigned_to_users.is_none()
    }

    /// Renders the update as a store patch, keeping the legacy
    /// `assignedTo` field synchronized with the list.
    pub(crate) fn into_patch(self) -> JsonValue {
        let mut patch = Map::new();
        if let Some(title) = self.title {
            patch.insert("title".to_string(), json!(title));
        }
        if let Some(description) = self.description {
            patch.insert("description".to_string(), json!(description));
        }
        if let Some(status) = self.status {
            patch.insert("status".to_string(), json!(status));
        }
        if let Some(priority) = self.priority {
            patch.insert("priority".to_string(), json!(priority));
        }
        if let Some(due_date) = self.due_date {
            patch.insert("dueDate".to_string(), json!(due_date));
        }
        if let Some(category) = self.category {
            patch.insert("category".to_string(), json!(category));
        }
        if let Some(hours) = self.estimated_hours {
            patch.insert("estimatedHours".to_string(), json!(hours));
        }
        if let Some(users) = self.assigned_to_users {
            patch.insert("assignedTo".to_string(), json!(users.first()));
            patch.insert("assignedToUsers".to_string(), json!(users));
        }
        JsonValue::Object(patch)
    }
}
