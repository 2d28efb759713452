/// Email rendering
///
/// Turns a notification payload into the subject and HTML body the
/// sender delivers. Rendering is pure; everything the templates need
/// is already denormalized into the payload when it is enqueued.

use chrono::{DateTime, Utc};
use synchro_core::entities::{NotificationKind, NotificationPayload, TaskPriority};

/// A fully rendered email, ready to hand to a sender.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub recipient_email: String,
    pub subject: String,
    pub html_body: String,
    pub kind: NotificationKind,
}

/// Renders a payload into an email.
pub fn render(payload: &NotificationPayload) -> RenderedEmail {
    let (subject, html_body) = match payload {
        NotificationPayload::Invitation {
            invited_by_email,
            project_name,
            role,
            ..
        } => (
            format!("You've been invited to join \"{}\" project", project_name),
            format!(
                "<p>{} has invited you to join <strong>{}</strong> as a {:?}.</p>\
                 <p>Sign in to accept or decline the invitation.</p>",
                invited_by_email, project_name, role
            ),
        ),
        NotificationPayload::TaskAssignment {
            task_title,
            task_description,
            project_name,
            created_by_email,
            priority,
            due_date,
            ..
        } => (
            format!("New task assigned: \"{}\" in \"{}\"", task_title, project_name),
            format!(
                "<p>{} assigned you a task in <strong>{}</strong>.</p>\
                 <p><strong>{}</strong></p>{}{}{}",
                created_by_email,
                project_name,
                task_title,
                description_block(task_description.as_deref()),
                priority_block(*priority),
                due_date_block(*due_date),
            ),
        ),
        NotificationPayload::TaskCompletion {
            task_title,
            project_name,
            completed_by_email,
            ..
        } => (
            format!("Task completed: \"{}\" in \"{}\"", task_title, project_name),
            format!(
                "<p>{} completed <strong>{}</strong> in {}.</p>",
                completed_by_email, task_title, project_name
            ),
        ),
    };

    RenderedEmail {
        recipient_email: payload.recipient_email().to_string(),
        subject,
        html_body,
        kind: payload.kind(),
    }
}

fn description_block(description: Option<&str>) -> String {
    match description {
        Some(text) if !text.is_empty() => format!("<p>{}</p>", text),
        _ => String::new(),
    }
}

fn priority_block(priority: Option<TaskPriority>) -> String {
    match priority {
        Some(priority) => format!("<p>Priority: {:?}</p>", priority),
        None => String::new(),
    }
}

fn due_date_block(due_date: Option<DateTime<Utc>>) -> String {
    match due_date {
        Some(due) => format!("<p>Due: {}</p>", due.format("%Y-%m-%d")),
        None => String::new(),
    }
}
