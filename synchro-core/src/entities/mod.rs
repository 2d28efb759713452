/// Typed entities stored in the document database
///
/// Each entity module pairs the in-memory type with its camelCase
/// wire shape, the conversions from a store `Record` (including the
/// envelope-timestamp conversion done at this boundary), and the
/// closed update-command type describing which partial mutations are
/// legal for that entity.
///
/// # Entities
///
/// - `user`: directory profiles with preferences
/// - `project`: projects with the embedded team-membership map
/// - `task`: project-scoped tasks with the dual assignee fields
/// - `invitation`: the pending/accepted/declined lifecycle records
/// - `notification`: durable outbox records consumed by the worker

pub mod invitation;
pub mod notification;
pub mod project;
pub mod task;
pub mod user;

pub use invitation::{CreateInvitation, Invitation, InvitationStatus, InviteRole};
pub use notification::{Notification, NotificationKind, NotificationPayload, NotificationStatus};
pub use project::{CreateProject, MemberRole, Project, ProjectUpdate, TeamMember, Visibility};
pub use task::{entered_done, CreateTask, Task, TaskPriority, TaskStatus, TaskUpdate};
pub use user::{AuthIdentity, User, UserPreferences};
