/// Invitation service
///
/// Creation enforces at most one pending invitation per (project,
/// invitee) pair, and settling an invitation is a compare-and-swap so
/// racing accept/decline calls cannot both win. Accepting only flips
/// the status here; the membership grant is the caller's next step,
/// and the worker's reconciliation sweep repairs any invitation left
/// accepted without its grant.

use std::sync::Arc;

use serde_json::json;
use validator::Validate;

use crate::entities::{
    CreateInvitation, Invitation, InvitationStatus, Notification, NotificationPayload,
};
use crate::error::{CoreError, CoreResult, StoreError};
use crate::store::{collections, DocumentStore, Filter, Query};

use super::query_with_fallback;

/// Lifecycle operations on invitations.
pub struct InvitationService {
    store: Arc<dyn DocumentStore>,
}

impl InvitationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        InvitationService { store }
    }

    /// Creates a pending invitation and enqueues the invite email.
    ///
    /// Fails with `DuplicateInvitation` when a pending invitation for
    /// the same project and invitee email already exists; settled
    /// ones do not block re-inviting.
    pub async fn create(&self, input: CreateInvitation) -> CoreResult<Invitation> {
        input.validate()?;
        let invited_to_email = input.invited_to_email.trim().to_lowercase();

        let duplicates = self
            .store
            .query(
                collections::INVITATIONS,
                Query::new()
                    .filter(Filter::eq("projectId", input.project_id.clone()))
                    .filter(Filter::eq("invitedToEmail", invited_to_email.clone()))
                    .filter(Filter::eq("status", InvitationStatus::Pending.as_str())),
            )
            .await?;
        if !duplicates.is_empty() {
            return Err(CoreError::DuplicateInvitation {
                project_id: input.project_id,
                invited_to: invited_to_email,
            });
        }

        let record = self
            .store
            .insert(collections::INVITATIONS, input.into_doc())
            .await?;
        let invitation = Invitation::from_record(&record)?;
        tracing::info!(
            invitation_id = %invitation.id,
            project_id = %invitation.project_id,
            invited_to = %invitation.invited_to_email,
            "invitation created"
        );

        self.enqueue_invite_email(&invitation).await;
        Ok(invitation)
    }

    /// Fetches an invitation by id.
    pub async fn get(&self, invitation_id: &str) -> CoreResult<Option<Invitation>> {
        match self.store.get(collections::INVITATIONS, invitation_id).await? {
            Some(record) => Ok(Some(Invitation::from_record(&record)?)),
            None => Ok(None),
        }
    }

    /// Lists pending invitations addressed to a user, newest first.
    pub async fn list_pending_for_user(&self, uid: &str) -> CoreResult<Vec<Invitation>> {
        self.list(
            Query::new()
                .filter(Filter::eq("invitedTo", uid))
                .filter(Filter::eq("status", InvitationStatus::Pending.as_str()))
                .order_by("createdAt", true),
        )
        .await
    }

    /// Lists pending invitations addressed to an email, newest first.
    /// Covers invitees who have not signed in yet.
    pub async fn list_pending_for_email(&self, email: &str) -> CoreResult<Vec<Invitation>> {
        self.list(
            Query::new()
                .filter(Filter::eq("invitedToEmail", email.trim().to_lowercase()))
                .filter(Filter::eq("status", InvitationStatus::Pending.as_str()))
                .order_by("createdAt", true),
        )
        .await
    }

    /// Lists a project's pending invitations, newest first.
    pub async fn list_pending_for_project(&self, project_id: &str) -> CoreResult<Vec<Invitation>> {
        self.list(
            Query::new()
                .filter(Filter::eq("projectId", project_id))
                .filter(Filter::eq("status", InvitationStatus::Pending.as_str()))
                .order_by("createdAt", true),
        )
        .await
    }

    /// Lists every accepted invitation. Used by the reconciliation
    /// sweep to find accepted invitations whose membership grant never
    /// landed.
    pub async fn list_accepted(&self) -> CoreResult<Vec<Invitation>> {
        self.list(
            Query::new().filter(Filter::eq("status", InvitationStatus::Accepted.as_str())),
        )
        .await
    }

    /// Marks a pending invitation accepted. The caller then grants
    /// membership on the project.
    pub async fn accept(&self, invitation_id: &str) -> CoreResult<Invitation> {
        self.settle(invitation_id, InvitationStatus::Accepted).await
    }

    /// Marks a pending invitation declined.
    pub async fn decline(&self, invitation_id: &str) -> CoreResult<Invitation> {
        self.settle(invitation_id, InvitationStatus::Declined).await
    }

    /// Deletes an invitation record.
    pub async fn delete(&self, invitation_id: &str) -> CoreResult<()> {
        self.store.delete(collections::INVITATIONS, invitation_id).await?;
        Ok(())
    }

    // Transitions pending -> accepted | declined under CAS; a settled
    // invitation never changes again.
    async fn settle(&self, invitation_id: &str, to: InvitationStatus) -> CoreResult<Invitation> {
        let record = self
            .store
            .get(collections::INVITATIONS, invitation_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                collection: collections::INVITATIONS.to_string(),
                id: invitation_id.to_string(),
            })?;
        let invitation = Invitation::from_record(&record)?;

        if invitation.status.is_terminal() {
            return Err(CoreError::InvitationSettled {
                id: invitation.id,
                status: invitation.status.as_str().to_string(),
            });
        }

        let updated = self
            .store
            .update(
                collections::INVITATIONS,
                invitation_id,
                json!({ "status": to }),
                Some(record.version),
            )
            .await
            .map_err(|e| match e {
                // A racing settle won; report the invitation as taken
                // rather than leaking the version mismatch.
                StoreError::VersionConflict { .. } => CoreError::InvitationSettled {
                    id: invitation_id.to_string(),
                    status: "settled concurrently".to_string(),
                },
                other => other.into(),
            })?;

        tracing::info!(%invitation_id, status = to.as_str(), "invitation settled");
        Ok(Invitation::from_record(&updated)?)
    }

    async fn list(&self, query: Query) -> CoreResult<Vec<Invitation>> {
        let records =
            query_with_fallback(self.store.as_ref(), collections::INVITATIONS, query).await?;
        records
            .iter()
            .map(|r| Invitation::from_record(r).map_err(CoreError::from))
            .collect()
    }

    async fn enqueue_invite_email(&self, invitation: &Invitation) {
        let payload = NotificationPayload::Invitation {
            invited_to_email: invitation.invited_to_email.clone(),
            invited_by_email: invitation.invited_by_email.clone(),
            project_name: invitation.project_name.clone(),
            role: invitation.role,
            project_id: invitation.project_id.clone(),
        };
        if let Err(e) = self
            .store
            .insert(collections::NOTIFICATIONS, Notification::pending_doc(payload))
            .await
        {
            tracing::warn!(invitation_id = %invitation.id, error = %e, "failed to enqueue invite email");
        }
    }
}
