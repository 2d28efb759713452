/// Integration tests for the worker against the core services
///
/// These drive the real service layer (not hand-built documents)
/// through a full enqueue-and-deliver cycle, plus the crash scenario
/// the reconciler exists for.

use std::collections::HashMap;
use std::sync::Arc;

use synchro_core::entities::{
    AuthIdentity, CreateInvitation, CreateProject, CreateTask, InviteRole, MemberRole,
    NotificationKind, TaskStatus, Visibility,
};
use synchro_core::services::{InvitationService, ProjectService, TaskService, UserDirectory};
use synchro_core::store::memory::MemoryStore;
use synchro_worker::dispatcher::{Dispatcher, DispatcherConfig};
use synchro_worker::reconciler::Reconciler;
use synchro_worker::sender::LogSender;

fn identity(uid: &str) -> AuthIdentity {
    AuthIdentity {
        uid: uid.to_string(),
        display_name: Some(uid.to_string()),
        email: Some(format!("{}@example.com", uid)),
        avatar_url: None,
    }
}

#[tokio::test]
async fn test_invite_email_flows_from_service_to_sender() {
    let store = Arc::new(MemoryStore::new());
    let invitations = InvitationService::new(store.clone());
    let sender = Arc::new(LogSender::new());
    let dispatcher = Dispatcher::new(store.clone(), sender.clone(), DispatcherConfig::default());

    invitations
        .create(CreateInvitation {
            project_id: "p1".to_string(),
            project_name: "Apollo".to_string(),
            invited_by: "owner".to_string(),
            invited_by_email: "owner@example.com".to_string(),
            invited_to: "buzz".to_string(),
            invited_to_email: "buzz@example.com".to_string(),
            role: InviteRole::Member,
        })
        .await
        .unwrap();

    let outcome = dispatcher.run_cycle().await.unwrap();
    assert_eq!(outcome.sent, 1);

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient_email, "buzz@example.com");
    assert_eq!(sent[0].kind, NotificationKind::Invitation);
    assert_eq!(
        sent[0].subject,
        "You've been invited to join \"Apollo\" project"
    );
}

#[tokio::test]
async fn test_completion_email_flows_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let users = UserDirectory::new(store.clone());
    let projects = ProjectService::new(store.clone());
    let tasks = TaskService::new(store.clone());
    let sender = Arc::new(LogSender::new());
    let dispatcher = Dispatcher::new(store.clone(), sender.clone(), DispatcherConfig::default());

    users.ensure(&identity("owner")).await.unwrap();
    users.ensure(&identity("buzz")).await.unwrap();
    let project = projects
        .create(CreateProject {
            project_name: "Apollo".to_string(),
            goal: "land".to_string(),
            deadline: None,
            created_by: "owner".to_string(),
            created_by_email: Some("owner@example.com".to_string()),
            visibility: Visibility::Private,
            team_members: HashMap::new(),
        })
        .await
        .unwrap();

    let task = tasks
        .create(CreateTask {
            project_id: project.id.clone(),
            title: "Dock".to_string(),
            description: None,
            status: TaskStatus::ToDo,
            priority: None,
            due_date: None,
            category: None,
            estimated_hours: None,
            assigned_to: None,
            assigned_to_users: vec![],
            created_by: "owner".to_string(),
        })
        .await
        .unwrap();
    tasks
        .update_status(&task.id, TaskStatus::Done, Some("buzz"))
        .await
        .unwrap();

    dispatcher.run_cycle().await.unwrap();

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient_email, "owner@example.com");
    assert_eq!(sent[0].subject, "Task completed: \"Dock\" in \"Apollo\"");
}

#[tokio::test]
async fn test_reconciler_closes_the_accept_gap() {
    let store = Arc::new(MemoryStore::new());
    let users = UserDirectory::new(store.clone());
    let projects = ProjectService::new(store.clone());
    let invitations = InvitationService::new(store.clone());
    let reconciler = Reconciler::new(store.clone());

    users.ensure(&identity("owner")).await.unwrap();
    users.ensure(&identity("buzz")).await.unwrap();
    let project = projects
        .create(CreateProject {
            project_name: "Apollo".to_string(),
            goal: "land".to_string(),
            deadline: None,
            created_by: "owner".to_string(),
            created_by_email: None,
            visibility: Visibility::Private,
            team_members: HashMap::new(),
        })
        .await
        .unwrap();

    let invitation = invitations
        .create(CreateInvitation {
            project_id: project.id.clone(),
            project_name: "Apollo".to_string(),
            invited_by: "owner".to_string(),
            invited_by_email: "owner@example.com".to_string(),
            invited_to: "buzz".to_string(),
            invited_to_email: "buzz@example.com".to_string(),
            role: InviteRole::Member,
        })
        .await
        .unwrap();

    // The client accepted, then crashed before granting membership.
    invitations.accept(&invitation.id).await.unwrap();
    assert!(!projects
        .get(&project.id)
        .await
        .unwrap()
        .unwrap()
        .is_member("buzz"));

    let outcome = reconciler.run_sweep().await.unwrap();
    assert_eq!(outcome.repaired, 1);

    let repaired = projects.get(&project.id).await.unwrap().unwrap();
    assert_eq!(repaired.role_of("buzz"), Some(MemberRole::Member));
}
