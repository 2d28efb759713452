/// Project service
///
/// Projects carry their team as an embedded map, so every membership
/// change is a read-modify-write of the whole map. Each mutation here
/// passes the record version back as a compare-and-swap precondition
/// and retries on conflict, which closes the lost-update window when
/// two admins edit the team at the same time.

use std::sync::Arc;

use serde_json::json;
use validator::Validate;

use crate::entities::{CreateProject, MemberRole, Project, ProjectUpdate, TeamMember};
use crate::error::{CoreError, CoreResult, StoreError};
use crate::store::{collections, DocumentStore, Filter, Query};

use super::query_with_fallback;

/// Retries for a contested membership write before giving up.
const MAX_MEMBER_WRITE_ATTEMPTS: u32 = 5;

/// CRUD and membership operations on projects.
pub struct ProjectService {
    store: Arc<dyn DocumentStore>,
}

impl ProjectService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        ProjectService { store }
    }

    /// Creates a project. The creator is materialized in the team map
    /// as Owner regardless of the supplied member list.
    pub async fn create(&self, input: CreateProject) -> CoreResult<Project> {
        input.validate()?;
        let record = self
            .store
            .insert(collections::PROJECTS, input.into_doc())
            .await?;
        let project = Project::from_record(&record)?;
        tracing::info!(project_id = %project.id, created_by = %project.created_by, "project created");
        Ok(project)
    }

    /// Fetches a project by id.
    pub async fn get(&self, project_id: &str) -> CoreResult<Option<Project>> {
        match self.store.get(collections::PROJECTS, project_id).await? {
            Some(record) => Ok(Some(Project::from_record(&record)?)),
            None => Ok(None),
        }
    }

    /// Lists every project `uid` belongs to, newest first.
    ///
    /// Membership is a presence check on the member's map key, which
    /// combined with the ordering needs a compound index; while that
    /// index builds, the fallback scan returns the same list.
    pub async fn list_for_user(&self, uid: &str) -> CoreResult<Vec<Project>> {
        let query = Query::new()
            .filter(Filter::present(&format!("teamMembers.{}", uid)))
            .order_by("createdAt", true);
        let records = query_with_fallback(self.store.as_ref(), collections::PROJECTS, query).await?;
        records
            .iter()
            .map(|r| Project::from_record(r).map_err(CoreError::from))
            .collect()
    }

    /// Applies a partial update to project fields. Membership is out
    /// of scope here; use the member operations below.
    pub async fn update(&self, project_id: &str, update: ProjectUpdate) -> CoreResult<Project> {
        if update.is_empty() {
            return match self.get(project_id).await? {
                Some(project) => Ok(project),
                None => Err(StoreError::NotFound {
                    collection: collections::PROJECTS.to_string(),
                    id: project_id.to_string(),
                }
                .into()),
            };
        }

        let record = self
            .store
            .update(collections::PROJECTS, project_id, update.into_patch(), None)
            .await?;
        Ok(Project::from_record(&record)?)
    }

    /// Deletes a project. The caller is responsible for its tasks.
    pub async fn delete(&self, project_id: &str) -> CoreResult<()> {
        self.store.delete(collections::PROJECTS, project_id).await?;
        tracing::info!(%project_id, "project deleted");
        Ok(())
    }

    /// Adds or replaces a member with `role`, stamping `joinedAt` now.
    pub async fn add_member(
        &self,
        project_id: &str,
        uid: &str,
        email: &str,
        role: MemberRole,
    ) -> CoreResult<()> {
        tracing::info!(%project_id, %uid, %email, role = role.as_str(), "adding member");
        let uid = uid.to_string();
        self.mutate_members(project_id, move |members| {
            members.insert(
                uid.clone(),
                TeamMember {
                    role,
                    joined_at: chrono::Utc::now(),
                },
            );
            true
        })
        .await
    }

    /// Removes a member. Removing someone who is not in the map is a
    /// no-op.
    pub async fn remove_member(&self, project_id: &str, uid: &str) -> CoreResult<()> {
        tracing::info!(%project_id, %uid, "removing member");
        let uid = uid.to_string();
        self.mutate_members(project_id, move |members| members.remove(&uid).is_some())
            .await
    }

    /// Changes an existing member's role, keeping their original
    /// `joinedAt`. Unknown members are left untouched.
    pub async fn update_member_role(
        &self,
        project_id: &str,
        uid: &str,
        role: MemberRole,
    ) -> CoreResult<()> {
        tracing::info!(%project_id, %uid, role = role.as_str(), "updating member role");
        let uid = uid.to_string();
        self.mutate_members(project_id, move |members| {
            match members.get_mut(&uid) {
                Some(member) => {
                    member.role = role;
                    true
                }
                None => false,
            }
        })
        .await
    }

    // Read-modify-write of the team map under a version precondition.
    // `mutate` returns false when the map is already in the desired
    // state, in which case no write is issued.
    async fn mutate_members<F>(&self, project_id: &str, mutate: F) -> CoreResult<()>
    where
        F: Fn(&mut std::collections::HashMap<String, TeamMember>) -> bool,
    {
        for attempt in 1..=MAX_MEMBER_WRITE_ATTEMPTS {
            let record = match self.store.get(collections::PROJECTS, project_id).await? {
                Some(record) => record,
                // The project was deleted out from under the caller;
                // there is no membership left to maintain.
                None => {
                    tracing::warn!(%project_id, "membership change on missing project, skipping");
                    return Ok(());
                }
            };
            let project = Project::from_record(&record)?;

            let mut members = project.team_members;
            if !mutate(&mut members) {
                return Ok(());
            }

            let patch = json!({ "teamMembers": members });
            match self
                .store
                .update(collections::PROJECTS, project_id, patch, Some(record.version))
                .await
            {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionConflict { .. }) => {
                    tracing::debug!(%project_id, attempt, "membership write conflicted, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::ConflictRetriesExhausted {
            project_id: project_id.to_string(),
            attempts: MAX_MEMBER_WRITE_ATTEMPTS,
        })
    }
}
