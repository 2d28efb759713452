/// Invitation entities
///
/// An invitation carries both the invitee's uid and their email: the
/// uid drives the signed-in inbox query, the email addresses the
/// invite message. The lifecycle is pending -> accepted | declined,
/// and both accepted and declined are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use validator::Validate;

use crate::entities::project::MemberRole;
use crate::error::StoreError;
use crate::store::{collections, Record};

/// Lifecycle state of an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
        }
    }

    /// Accepted and declined invitations never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }
}

/// Role granted when the invitation is accepted. Owner cannot be
/// granted by invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InviteRole {
    Member,
    Viewer,
}

impl From<InviteRole> for MemberRole {
    fn from(role: InviteRole) -> Self {
        match role {
            InviteRole::Member => MemberRole::Member,
            InviteRole::Viewer => MemberRole::Viewer,
        }
    }
}

/// An invitation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: String,
    pub project_id: String,
    pub project_name: String,
    pub invited_by: String,
    pub invited_by_email: String,
    /// Invitee uid.
    pub invited_to: String,
    /// Invitee email, lowercased.
    pub invited_to_email: String,
    pub role: InviteRole,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Wire shape of an `invitations/{id}` document body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvitationDoc {
    project_id: String,
    project_name: String,
    invited_by: String,
    invited_by_email: String,
    invited_to: String,
    invited_to_email: String,
    role: InviteRole,
    status: InvitationStatus,
}

impl Invitation {
    /// Decodes a stored record, converting envelope timestamps.
    pub fn from_record(record: &Record) -> Result<Self, StoreError> {
        let doc: InvitationDoc =
            serde_json::from_value(record.data.clone()).map_err(|e| StoreError::Malformed {
                collection: collections::INVITATIONS.to_string(),
                id: record.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Invitation {
            id: record.id.clone(),
            project_id: doc.project_id,
            project_name: doc.project_name,
            invited_by: doc.invited_by,
            invited_by_email: doc.invited_by_email,
            invited_to: doc.invited_to,
            invited_to_email: doc.invited_to_email,
            role: doc.role,
            status: doc.status,
            created_at: record.created_at.to_datetime(),
            updated_at: record.updated_at.to_datetime(),
        })
    }
}

/// Input for creating an invitation.
#[derive(Debug, Clone, Validate)]
pub struct CreateInvitation {
    pub project_id: String,
    pub project_name: String,

    pub invited_by: String,

    #[validate(email)]
    pub invited_by_email: String,

    /// Invitee uid.
    pub invited_to: String,

    /// Invitee email; normalized to lowercase before storage.
    #[validate(email)]
    pub invited_to_email: String,

    pub role: InviteRole,
}

impl CreateInvitation {
    /// Builds the document body with a lowercased invitee email and
    /// the pending status.
    pub(crate) fn into_doc(self) -> JsonValue {
        json!(InvitationDoc {
            project_id: self.project_id,
            project_name: self.project_name,
            invited_by: self.invited_by,
            invited_by_email: self.invited_by_email,
            invited_to: self.invited_to,
            invited_to_email: self.invited_to_email.trim().to_lowercase(),
            role: self.role,
            status: InvitationStatus::Pending,
        })
    }
}
