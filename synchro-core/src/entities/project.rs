/// Project and membership entities
///
/// A project embeds its team as a map from uid to `{role, joinedAt}`;
/// membership changes are map mutations on the project document, not
/// writes to a separate collection. The creator is always materialized
/// in the map with role Owner at creation time, so read paths may rely
/// on the map alone.
///
/// # Roles
///
/// - **Owner**: edit or delete the project, manage members, any task
/// - **Member**: create and update tasks
/// - **Viewer**: read-only access

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashMap;
use validator::Validate;

use crate::error::StoreError;
use crate::store::{collections, Record};

/// Role of a user within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberRole {
    /// The creator: full control including deletion.
    Owner,

    /// Can create and manage tasks.
    Member,

    /// Read-only access.
    Viewer,
}

impl MemberRole {
    /// Converts role to its stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "Owner",
            MemberRole::Member => "Member",
            MemberRole::Viewer => "Viewer",
        }
    }

    /// Can edit project fields and manage membership.
    pub fn can_manage_project(&self) -> bool {
        matches!(self, MemberRole::Owner)
    }

    /// Can create tasks in the project.
    pub fn can_create_tasks(&self) -> bool {
        !matches!(self, MemberRole::Viewer)
    }
}

/// Project visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

/// One entry in a project's team-membership map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

/// A project with its embedded team map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub project_name: String,
    pub goal: String,
    pub deadline: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_by_email: Option<String>,
    pub team_members: HashMap<String, TeamMember>,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Wire shape of a `projects/{id}` document body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectDoc {
    project_name: String,
    goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deadline: Option<DateTime<Utc>>,
    created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_by_email: Option<String>,
    #[serde(default)]
    team_members: HashMap<String, TeamMember>,
    visibility: Visibility,
}

impl Project {
    /// Decodes a stored record, converting envelope timestamps.
    pub fn from_record(record: &Record) -> Result<Self, StoreError> {
        let doc: ProjectDoc =
            serde_json::from_value(record.data.clone()).map_err(|e| StoreError::Malformed {
                collection: collections::PROJECTS.to_string(),
                id: record.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Project {
            id: record.id.clone(),
            project_name: doc.project_name,
            goal: doc.goal,
            deadline: doc.deadline,
            created_by: doc.created_by,
            created_by_email: doc.created_by_email,
            team_members: doc.team_members,
            visibility: doc.visibility,
            created_at: record.created_at.to_datetime(),
            updated_at: record.updated_at.to_datetime(),
        })
    }

    /// True when `uid` appears in the team map.
    pub fn is_member(&self, uid: &str) -> bool {
        self.team_members.contains_key(uid)
    }

    /// Role of `uid` within this project, if any.
    pub fn role_of(&self, uid: &str) -> Option<MemberRole> {
        self.team_members.get(uid).map(|m| m.role)
    }
}

/// Input for creating a project.
#[derive(Debug, Clone, Validate)]
pub struct CreateProject {
    #[validate(length(min = 1, max = 200))]
    pub project_name: String,

    #[validate(length(min = 1))]
    pub goal: String,

    pub deadline: Option<DateTime<Utc>>,

    /// The creator; always materialized as Owner in the team map.
    pub created_by: String,

    pub created_by_email: Option<String>,

    pub visibility: Visibility,

    /// Additional initial members. An entry for the creator, if
    /// present, is overwritten with role Owner.
    pub team_members: HashMap<String, TeamMember>,
}

impl CreateProject {
    /// Builds the document body, forcing the creator into the team
    /// map as Owner.
    pub(crate) fn into_doc(self) -> JsonValue {
        let mut team_members = self.team_members;
        team_members.insert(
            self.created_by.clone(),
            TeamMember {
                role: MemberRole::Owner,
                joined_at: Utc::now(),
            },
        );
        json!(ProjectDoc {
            project_name: self.project_name,
            goal: self.goal,
            deadline: self.deadline,
            created_by: self.created_by,
            created_by_email: self.created_by_email,
            team_members,
            visibility: self.visibility,
        })
    }
}

/// The closed set of legal partial updates to a project.
///
/// Membership changes go through the dedicated member operations, not
/// through this type.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub project_name: Option<String>,
    pub goal: Option<String>,

    /// `Some(None)` clears the deadline.
    pub deadline: Option<Option<DateTime<Utc>>>,

    pub visibility: Option<Visibility>,
}

impl ProjectUpdate {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.project_name.is_none()
            && self.goal.is_none()
            && self.deadline.is_none()
            && self.visibility.is_none()
    }

    /// Renders the update as a store patch.
    pub(crate) fn into_patch(self) -> JsonValue {
        let mut patch = Map::new();
        if let Some(name) = self.project_name {
            patch.insert("projectName".to_string(), json!(name));
        }
        if let Some(goal) = self.goal {
            patch.insert("goal".to_string(), json!(goal));
        }
        if let Some(deadline) = self.deadline {
            patch.insert("deadline".to_string(), json!(deadline));
        }
        if let Some(visibility) = self.visibility {
            patch.insert("visibility".to_string(), json!(visibility));
        }
        JsonValue::Object(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Timestamp;

    #[test]
    fn test_role_strings_and_permissions() {
        assert_eq!(MemberRole::Owner.as_str(), "Owner");
        assert_eq!(MemberRole::Member.as_str(), "Member");
        assert_eq!(MemberRole::Viewer.as_str(), "Viewer");

        assert!(MemberRole::Owner.can_manage_project());
        assert!(!MemberRole::Member.can_manage_project());
        assert!(MemberRole::Member.can_create_tasks());
        assert!(!MemberRole::Viewer.can_create_tasks());
    }

    #[test]
    fn test_create_materializes_owner() {
        let input = CreateProject {
            project_name: "Apollo".to_string(),
            goal: "Land".to_string(),
            deadline: None,
            created_by: "u1".to_string(),
            created_by_email: Some("u1@example.com".to_string()),
            visibility: Visibility::Private,
            team_members: HashMap::new(),
        };
        let doc = input.into_doc();
        assert_eq!(doc["teamMembers"]["u1"]["role"], "Owner");
        assert_eq!(doc["visibility"], "private");
    }

    #[test]
    fn test_create_overrides_creator_entry() {
        let mut members = HashMap::new();
        members.insert(
            "u1".to_string(),
            TeamMember {
                role: MemberRole::Viewer,
                joined_at: Utc::now(),
            },
        );
        let input = CreateProject {
            project_name: "Apollo".to_string(),
            goal: "Land".to_string(),
            deadline: None,
            created_by: "u1".to_string(),
            created_by_email: None,
            visibility: Visibility::Public,
            team_members: members,
        };
        let doc = input.into_doc();
        // A contradicting creator entry is forced back to Owner.
        assert_eq!(doc["teamMembers"]["u1"]["role"], "Owner");
    }

    #[test]
    fn test_from_record_and_membership_helpers() {
        let record = Record {
            id: "p1".to_string(),
            version: 1,
            created_at: Timestamp { seconds: 10, nanos: 0 },
            updated_at: Timestamp { seconds: 10, nanos: 0 },
            data: json!({
                "projectName": "Apollo",
                "goal": "Land",
                "createdBy": "u1",
                "visibility": "private",
                "teamMembers": {
                    "u1": {"role": "Owner", "joinedAt": "2024-01-01T00:00:00Z"},
                    "u2": {"role": "Viewer", "joinedAt": "2024-01-02T00:00:00Z"}
                }
            }),
        };

        let project = Project::from_record(&record).unwrap();
        assert!(project.is_member("u1"));
        assert!(!project.is_member("u3"));
        assert_eq!(project.role_of("u2"), Some(MemberRole::Viewer));
        assert_eq!(project.created_at.timestamp(), 10);
    }

    #[test]
    fn test_update_patch_clears_deadline_with_null() {
        let update = ProjectUpdate {
            deadline: Some(None),
            ..Default::default()
        };
        let patch = update.into_patch();
        assert!(patch["deadline"].is_null());
        assert!(patch.get("goal").is_none());
    }

    #[test]
    fn test_empty_update() {
        assert!(ProjectUpdate::default().is_empty());
        assert!(!ProjectUpdate {
            goal: Some("g".to_string()),
            ..Default::default()
        }
        .is_empty());
    }
}
