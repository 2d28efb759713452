/// Invitation reconciliation sweep
///
/// Accepting an invitation and granting the membership are two writes
/// with no transaction between them; a client crash in the gap leaves
/// an invitation accepted while its project never learned about the
/// member. This sweep finds those invitations and replays the grant.
///
/// The repair is idempotent: granting a membership that already
/// exists rewrites the same map entry, and invitations whose project
/// no longer exists are skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use synchro_core::entities::{Invitation, MemberRole};
use synchro_core::error::CoreResult;
use synchro_core::services::{InvitationService, ProjectService};
use synchro_core::store::DocumentStore;

/// Default delay between reconciliation sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// What one sweep found and fixed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Accepted invitations inspected.
    pub inspected: usize,

    /// Memberships replayed onto their projects.
    pub repaired: usize,

    /// Invitations skipped (already granted, project gone, no uid).
    pub skipped: usize,
}

/// The repair sweep for accepted-but-ungranted invitations.
pub struct Reconciler {
    invitations: InvitationService,
    projects: ProjectService,
    interval: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Reconciler {
            invitations: InvitationService::new(store.clone()),
            projects: ProjectService::new(store),
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs the sweep loop until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "invitation reconciler started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("reconciler shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {
                    match self.run_sweep().await {
                        Ok(outcome) if outcome.repaired > 0 => {
                            tracing::info!(
                                inspected = outcome.inspected,
                                repaired = outcome.repaired,
                                skipped = outcome.skipped,
                                "reconciliation sweep repaired memberships"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "reconciliation sweep failed"),
                    }
                }
            }
        }
    }

    /// Inspects every accepted invitation and replays missing grants.
    pub async fn run_sweep(&self) -> CoreResult<SweepOutcome> {
        let accepted = self.invitations.list_accepted().await?;
        let mut outcome = SweepOutcome {
            inspected: accepted.len(),
            ..Default::default()
        };

        for invitation in accepted {
            match self.repair(&invitation).await {
                Ok(true) => outcome.repaired += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        invitation_id = %invitation.id,
                        error = %e,
                        "failed to repair invitation"
                    );
                    outcome.skipped += 1;
                }
            }
        }
        Ok(outcome)
    }

    // Returns Ok(true) when a grant was replayed, Ok(false) when the
    // invitation needed nothing or cannot be repaired.
    async fn repair(&self, invitation: &Invitation) -> CoreResult<bool> {
        if invitation.invited_to.is_empty() {
            return Ok(false);
        }

        let project = match self.projects.get(&invitation.project_id).await? {
            Some(project) => project,
            None => return Ok(false),
        };

        if project.is_member(&invitation.invited_to) {
            return Ok(false);
        }

        tracing::info!(
            invitation_id = %invitation.id,
            project_id = %project.id,
            uid = %invitation.invited_to,
            "replaying membership grant for accepted invitation"
        );
        self.projects
            .add_member(
                &project.id,
                &invitation.invited_to,
                &invitation.invited_to_email,
                MemberRole::from(invitation.role),
            )
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use synchro_core::entities::{CreateInvitation, CreateProject, InviteRole, Visibility};
    use synchro_core::store::memory::MemoryStore;

    struct Fixture {
        invitations: InvitationService,
        projects: ProjectService,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            invitations: InvitationService::new(store.clone()),
            projects: ProjectService::new(store.clone()),
            reconciler: Reconciler::new(store),
        }
    }

    async fn accepted_invitation(
        f: &Fixture,
        project_id: &str,
        uid: &str,
        email: &str,
        role: InviteRole,
    ) -> Invitation {
        let invitation = f
            .invitations
            .create(CreateInvitation {
                project_id: project_id.to_string(),
                project_name: "Apollo".to_string(),
                invited_by: "owner".to_string(),
                invited_by_email: "owner@example.com".to_string(),
                invited_to: uid.to_string(),
                invited_to_email: email.to_string(),
                role,
            })
            .await
            .unwrap();
        f.invitations.accept(&invitation.id).await.unwrap()
    }

    fn new_project(owner: &str) -> CreateProject {
        CreateProject {
            project_name: "Apollo".to_string(),
            goal: "ship".to_string(),
            deadline: None,
            created_by: owner.to_string(),
            created_by_email: None,
            visibility: Visibility::Private,
            team_members: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_sweep_repairs_accepted_without_grant() {
        let f = fixture();
        let project = f.projects.create(new_project("owner")).await.unwrap();

        // Accept landed but the grant never did.
        accepted_invitation(&f, &project.id, "buzz", "buzz@example.com", InviteRole::Member).await;

        let outcome = f.reconciler.run_sweep().await.unwrap();
        assert_eq!(outcome.repaired, 1);

        let project = f.projects.get(&project.id).await.unwrap().unwrap();
        assert_eq!(project.role_of("buzz"), Some(MemberRole::Member));

        // The sweep is idempotent.
        let outcome = f.reconciler.run_sweep().await.unwrap();
        assert_eq!(outcome.repaired, 0);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn test_sweep_skips_granted_and_missing() {
        let f = fixture();
        let project = f.projects.create(new_project("owner")).await.unwrap();

        // Grant already landed for this one.
        accepted_invitation(&f, &project.id, "buzz", "buzz@example.com", InviteRole::Member).await;
        f.projects
            .add_member(&project.id, "buzz", "buzz@example.com", MemberRole::Member)
            .await
            .unwrap();

        // This one points at a deleted project.
        accepted_invitation(&f, "gone", "buzz", "buzz@example.com", InviteRole::Member).await;

        let outcome = f.reconciler.run_sweep().await.unwrap();
        assert_eq!(outcome.inspected, 2);
        assert_eq!(outcome.repaired, 0);
        assert_eq!(outcome.skipped, 2);
    }

    #[tokio::test]
    async fn test_sweep_ignores_pending_and_declined() {
        let f = fixture();
        let project = f.projects.create(new_project("owner")).await.unwrap();

        f.invitations
            .create(CreateInvitation {
                project_id: project.id.clone(),
                project_name: "Apollo".to_string(),
                invited_by: "owner".to_string(),
                invited_by_email: "owner@example.com".to_string(),
                invited_to: "pending".to_string(),
                invited_to_email: "pending@example.com".to_string(),
                role: InviteRole::Viewer,
            })
            .await
            .unwrap();

        let declined = f
            .invitations
            .create(CreateInvitation {
                project_id: project.id.clone(),
                project_name: "Apollo".to_string(),
                invited_by: "owner".to_string(),
                invited_by_email: "owner@example.com".to_string(),
                invited_to: "declined".to_string(),
                invited_to_email: "declined@example.com".to_string(),
                role: InviteRole::Viewer,
            })
            .await
            .unwrap();
        f.invitations.decline(&declined.id).await.unwrap();

        let outcome = f.reconciler.run_sweep().await.unwrap();
        assert_eq!(outcome.inspected, 0);
    }

    #[tokio::test]
    async fn test_repair_uses_invitation_role() {
        let f = fixture();
        let project = f.projects.create(new_project("owner")).await.unwrap();

        accepted_invitation(&f, &project.id, "sally", "sally@example.com", InviteRole::Viewer)
            .await;

        f.reconciler.run_sweep().await.unwrap();

        let project = f.projects.get(&project.id).await.unwrap().unwrap();
        assert_eq!(project.role_of("sally"), Some(MemberRole::Viewer));
    }
}
