/// Task service
///
/// Task writes can trigger email, but never send it: triggers enqueue
/// durable notification records for the worker to deliver. A failed
/// enqueue is logged and swallowed, so the task write that triggered
/// it always stands on its own.
///
/// Every project has a hard ceiling on task count, checked before the
/// insert. The check-then-insert pair is not atomic; a concurrent
/// burst can overshoot by a few tasks, which is accepted.

use std::sync::Arc;

use futures::future::join_all;
use validator::Validate;

use crate::entities::{
    entered_done, CreateTask, Notification, NotificationPayload, Project, Task, TaskStatus,
    TaskUpdate, User,
};
use crate::error::{CoreError, CoreResult, StoreError};
use crate::store::{collections, DocumentStore, Filter, Query};

use super::query_with_fallback;

/// Hard ceiling on tasks per project.
pub const MAX_TASKS_PER_PROJECT: usize = 100;

/// CRUD, the per-project ceiling, and notification triggers for tasks.
pub struct TaskService {
    store: Arc<dyn DocumentStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        TaskService { store }
    }

    /// Number of tasks currently in a project.
    pub async fn count_for_project(&self, project_id: &str) -> CoreResult<usize> {
        let query = Query::new().filter(Filter::eq("projectId", project_id));
        let records = self.store.query(collections::TASKS, query).await?;
        Ok(records.len())
    }

    /// Creates a task after checking the project ceiling. When the
    /// task starts out assigned, an assignment notification is
    /// enqueued per assignee.
    pub async fn create(&self, input: CreateTask) -> CoreResult<Task> {
        input.validate()?;

        let count = self.count_for_project(&input.project_id).await?;
        if count >= MAX_TASKS_PER_PROJECT {
            return Err(CoreError::TaskLimitReached {
                project_id: input.project_id.clone(),
                limit: MAX_TASKS_PER_PROJECT,
            });
        }

        let input = input.normalized();
        let record = self
            .store
            .insert(collections::TASKS, input.into_doc())
            .await?;
        let task = Task::from_record(&record)?;
        tracing::info!(task_id = %task.id, project_id = %task.project_id, "task created");

        let assignees = task.assignees();
        if !assignees.is_empty() {
            self.enqueue_assignment_notifications(&task, &assignees).await;
        }
        Ok(task)
    }

    /// Fetches a task by id.
    pub async fn get(&self, task_id: &str) -> CoreResult<Option<Task>> {
        match self.store.get(collections::TASKS, task_id).await? {
            Some(record) => Ok(Some(Task::from_record(&record)?)),
            None => Ok(None),
        }
    }

    /// Lists a project's tasks, newest first. Falls back to an
    /// in-memory scan while the compound index builds.
    pub async fn list_for_project(&self, project_id: &str) -> CoreResult<Vec<Task>> {
        let query = Query::new()
            .filter(Filter::eq("projectId", project_id))
            .order_by("createdAt", true);
        let records = query_with_fallback(self.store.as_ref(), collections::TASKS, query).await?;
        records
            .iter()
            .map(|r| Task::from_record(r).map_err(CoreError::from))
            .collect()
    }

    /// Lists every task assigned to `uid` across projects, newest
    /// first.
    ///
    /// Assignment lives in two fields (the legacy single uid and the
    /// list), so no single store filter covers it; this is always a
    /// scan with in-memory filtering.
    pub async fn list_for_user(&self, uid: &str) -> CoreResult<Vec<Task>> {
        let records = self.store.query(collections::TASKS, Query::new()).await?;
        let mut tasks = Vec::new();
        for record in &records {
            let task = Task::from_record(record)?;
            if task.is_assigned_to(uid) {
                tasks.push(task);
            }
        }
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(tasks)
    }

    /// Applies a partial update. When the update moves the task into
    /// Done from any other status, a completion notification for the
    /// project owner is enqueued; re-saving an already-Done task does
    /// not notify again.
    ///
    /// `actor_uid` identifies who made the change, for the completion
    /// email.
    pub async fn update(
        &self,
        task_id: &str,
        update: TaskUpdate,
        actor_uid: Option<&str>,
    ) -> CoreResult<Task> {
        let before = match self.store.get(collections::TASKS, task_id).await? {
            Some(record) => Task::from_record(&record)?,
            None => {
                return Err(StoreError::NotFound {
                    collection: collections::TASKS.to_string(),
                    id: task_id.to_string(),
                }
                .into())
            }
        };

        if update.is_empty() {
            return Ok(before);
        }

        let next_status = update.status;
        let record = self
            .store
            .update(collections::TASKS, task_id, update.into_patch(), None)
            .await?;
        let task = Task::from_record(&record)?;

        if let Some(next) = next_status {
            if entered_done(before.status, next) {
                self.enqueue_completion_notification(&task, actor_uid).await;
            }
        }
        Ok(task)
    }

    /// Moves a task to a new status.
    pub async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        actor_uid: Option<&str>,
    ) -> CoreResult<Task> {
        self.update(
            task_id,
            TaskUpdate {
                status: Some(status),
                ..Default::default()
            },
            actor_uid,
        )
        .await
    }

    /// Rewrites the assignee list.
    pub async fn assign(&self, task_id: &str, assignees: Vec<String>) -> CoreResult<Task> {
        self.update(
            task_id,
            TaskUpdate {
                assigned_to_users: Some(assignees),
                ..Default::default()
            },
            None,
        )
        .await
    }

    /// Deletes a task.
    pub async fn delete(&self, task_id: &str) -> CoreResult<()> {
        self.store.delete(collections::TASKS, task_id).await?;
        tracing::info!(%task_id, "task deleted");
        Ok(())
    }

    // Looks up a profile, tolerating absence and malformed docs; the
    // notification paths degrade instead of failing the task write.
    async fn profile(&self, uid: &str) -> Option<User> {
        match self.store.get(collections::USERS, uid).await {
            Ok(Some(record)) => User::from_record(&record).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(%uid, error = %e, "profile lookup failed");
                None
            }
        }
    }

    async fn project_of(&self, task: &Task) -> Option<Project> {
        match self.store.get(collections::PROJECTS, &task.project_id).await {
            Ok(Some(record)) => Project::from_record(&record).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(project_id = %task.project_id, error = %e, "project lookup failed");
                None
            }
        }
    }

    async fn enqueue(&self, payload: NotificationPayload) {
        let kind = payload.kind();
        if let Err(e) = self
            .store
            .insert(collections::NOTIFICATIONS, Notification::pending_doc(payload))
            .await
        {
            tracing::warn!(kind = kind.as_str(), error = %e, "failed to enqueue notification");
        }
    }

    async fn enqueue_assignment_notifications(&self, task: &Task, assignees: &[String]) {
        let project = self.project_of(task).await;
        let project_name = project
            .as_ref()
            .map(|p| p.project_name.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let created_by_email = match self.profile(&task.created_by).await {
            Some(user) if !user.email.is_empty() => user.email,
            _ => "Unknown".to_string(),
        };

        let profiles = join_all(assignees.iter().map(|uid| self.profile(uid))).await;
        for (uid, profile) in assignees.iter().zip(profiles) {
            let assignee_email = match profile {
                Some(user) if !user.email.is_empty() => user.email,
                _ => {
                    tracing::warn!(%uid, task_id = %task.id, "assignee has no email, skipping notification");
                    continue;
                }
            };
            self.enqueue(NotificationPayload::TaskAssignment {
                assignee_email,
                task_title: task.title.clone(),
                task_description: task.description.clone(),
                project_name: project_name.clone(),
                created_by_email: created_by_email.clone(),
                priority: task.priority,
                due_date: task.due_date,
                project_id: task.project_id.clone(),
            })
            .await;
        }
    }

    async fn enqueue_completion_notification(&self, task: &Task, actor_uid: Option<&str>) {
        let project = match self.project_of(task).await {
            Some(project) => project,
            None => {
                tracing::warn!(task_id = %task.id, "completed task has no project, skipping notification");
                return;
            }
        };

        let owner_email = match &project.created_by_email {
            Some(email) if !email.is_empty() => email.clone(),
            _ => match self.profile(&project.created_by).await {
                Some(user) if !user.email.is_empty() => user.email,
                _ => {
                    tracing::warn!(project_id = %project.id, "project owner has no email, skipping notification");
                    return;
                }
            },
        };

        let completed_by_email = match actor_uid {
            Some(uid) => match self.profile(uid).await {
                Some(user) if !user.email.is_empty() => user.email,
                _ => "Unknown".to_string(),
            },
            None => "Unknown".to_string(),
        };

        self.enqueue(NotificationPayload::TaskCompletion {
            owner_email,
            task_title: task.title.clone(),
            project_name: project.project_name,
            completed_by_email,
            project_id: task.project_id.clone(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::NotificationStatus;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn create_input(project_id: &str, title: &str) -> CreateTask {
        CreateTask {
            project_id: project_id.to_string(),
            title: title.to_string(),
            description: None,
            status: TaskStatus::ToDo,
            priority: None,
            due_date: None,
            category: None,
            estimated_hours: None,
            assigned_to: None,
            assigned_to_users: vec![],
            created_by: "u1".to_string(),
        }
    }

    async fn seed_project(store: &MemoryStore, id: &str, owner_email: Option<&str>) {
        store
            .insert_with_id(
                collections::PROJECTS,
                id,
                json!({
                    "projectName": "Apollo",
                    "goal": "ship",
                    "createdBy": "u1",
                    "createdByEmail": owner_email,
                    "visibility": "private",
                    "teamMembers": {"u1": {"role": "Owner", "joinedAt": "2024-01-01T00:00:00Z"}}
                }),
            )
            .await
            .unwrap();
    }

    async fn seed_user(store: &MemoryStore, uid: &str, email: &str) {
        store
            .insert_with_id(
                collections::USERS,
                uid,
                json!({"displayName": uid, "email": email}),
            )
            .await
            .unwrap();
    }

    fn service() -> (Arc<MemoryStore>, TaskService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), TaskService::new(store))
    }

    async fn pending_notifications(store: &MemoryStore) -> Vec<crate::entities::Notification> {
        let records = store
            .query(collections::NOTIFICATIONS, Query::new())
            .await
            .unwrap();
        records
            .iter()
            .map(|r| Notification::from_record(r).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_, tasks) = service();
        let task = tasks.create(create_input("p1", "Write docs")).await.unwrap();
        assert_eq!(task.status, TaskStatus::ToDo);

        let fetched = tasks.get(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Write docs");
    }

    #[tokio::test]
    async fn test_ceiling_blocks_creation() {
        let (_, tasks) = service();
        for i in 0..MAX_TASKS_PER_PROJECT {
            tasks
                .create(create_input("p1", &format!("task {}", i)))
                .await
                .unwrap();
        }

        let err = tasks.create(create_input("p1", "one too many")).await.unwrap_err();
        assert!(matches!(err, CoreError::TaskLimitReached { limit, .. } if limit == 100));

        // A different project is unaffected.
        tasks.create(create_input("p2", "fine")).await.unwrap();
    }

    #[tokio::test]
    async fn test_ceiling_frees_after_delete() {
        let (_, tasks) = service();
        let mut last = None;
        for i in 0..MAX_TASKS_PER_PROJECT {
            last = Some(tasks.create(create_input("p1", &format!("task {}", i))).await.unwrap());
        }

        tasks.delete(&last.unwrap().id).await.unwrap();
        tasks.create(create_input("p1", "fits again")).await.unwrap();
    }

    #[tokio::test]
    async fn test_assignment_enqueues_notification_per_assignee() {
        let (store, tasks) = service();
        seed_project(&store, "p1", Some("u1@example.com")).await;
        seed_user(&store, "u1", "u1@example.com").await;
        seed_user(&store, "u2", "u2@example.com").await;
        seed_user(&store, "u3", "u3@example.com").await;

        let mut input = create_input("p1", "Pair on this");
        input.assigned_to_users = vec!["u2".to_string(), "u3".to_string()];
        tasks.create(input).await.unwrap();

        let notifications = pending_notifications(&store).await;
        assert_eq!(notifications.len(), 2);
        let mut recipients: Vec<&str> = notifications
            .iter()
            .map(|n| n.payload.recipient_email())
            .collect();
        recipients.sort();
        assert_eq!(recipients, vec!["u2@example.com", "u3@example.com"]);
        assert!(notifications
            .iter()
            .all(|n| n.status == NotificationStatus::Pending));
    }

    #[tokio::test]
    async fn test_unassigned_create_enqueues_nothing() {
        let (store, tasks) = service();
        seed_project(&store, "p1", Some("u1@example.com")).await;
        tasks.create(create_input("p1", "Solo")).await.unwrap();
        assert!(pending_notifications(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_completion_notifies_owner_once() {
        let (store, tasks) = service();
        seed_project(&store, "p1", Some("owner@example.com")).await;
        seed_user(&store, "u2", "u2@example.com").await;

        let task = tasks.create(create_input("p1", "Finish it")).await.unwrap();

        tasks
            .update_status(&task.id, TaskStatus::Done, Some("u2"))
            .await
            .unwrap();

        let notifications = pending_notifications(&store).await;
        assert_eq!(notifications.len(), 1);
        match &notifications[0].payload {
            NotificationPayload::TaskCompletion {
                owner_email,
                completed_by_email,
                ..
            } => {
                assert_eq!(owner_email, "owner@example.com");
                assert_eq!(completed_by_email, "u2@example.com");
            }
            other => panic!("unexpected payload: {:?}", other),
        }

        // Re-saving a Done task does not notify again.
        tasks
            .update_status(&task.id, TaskStatus::Done, Some("u2"))
            .await
            .unwrap();
        assert_eq!(pending_notifications(&store).await.len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_then_complete_notifies_again() {
        let (store, tasks) = service();
        seed_project(&store, "p1", Some("owner@example.com")).await;

        let task = tasks.create(create_input("p1", "Flaky fix")).await.unwrap();
        tasks.update_status(&task.id, TaskStatus::Done, None).await.unwrap();
        tasks.update_status(&task.id, TaskStatus::InProgress, None).await.unwrap();
        tasks.update_status(&task.id, TaskStatus::Done, None).await.unwrap();

        assert_eq!(pending_notifications(&store).await.len(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_task_is_not_found() {
        let (_, tasks) = service();
        let err = tasks
            .update_status("nope", TaskStatus::Done, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_for_project_falls_back_while_index_builds() {
        let (store, tasks) = service();
        let a = tasks.create(create_input("p1", "first")).await.unwrap();
        let b = tasks.create(create_input("p1", "second")).await.unwrap();
        tasks.create(create_input("p2", "other")).await.unwrap();

        store.set_compound_index_ready(collections::TASKS, false);

        let listed = tasks.list_for_project("p1").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![b.id.as_str(), a.id.as_str()]);
    }

    #[tokio::test]
    async fn test_list_for_user_covers_both_assignee_fields() {
        let (store, tasks) = service();

        // Legacy doc with only the single assignee field.
        store
            .insert(
                collections::TASKS,
                json!({
                    "projectId": "p1",
                    "title": "legacy",
                    "status": "To Do",
                    "assignedTo": "u2",
                    "createdBy": "u1"
                }),
            )
            .await
            .unwrap();

        let mut input = create_input("p1", "modern");
        input.assigned_to_users = vec!["u2".to_string()];
        tasks.create(input).await.unwrap();

        let listed = tasks.list_for_user("u2").await.unwrap();
        assert_eq!(listed.len(), 2);
        // Newest first.
        assert_eq!(listed[0].title, "modern");
    }

    #[tokio::test]
    async fn test_assign_rewrites_both_fields() {
        let (_, tasks) = service();
        let task = tasks.create(create_input("p1", "t")).await.unwrap();

        let assigned = tasks
            .assign(&task.id, vec!["u5".to_string(), "u6".to_string()])
            .await
            .unwrap();
        assert_eq!(assigned.assigned_to.as_deref(), Some("u5"));
        assert_eq!(assigned.assigned_to_users, vec!["u5", "u6"]);

        let cleared = tasks.assign(&task.id, vec![]).await.unwrap();
        assert!(cleared.assigned_to.is_none());
        assert!(cleared.assigned_to_users.is_empty());
    }
}
