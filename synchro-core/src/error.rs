/// Error types for the synchronization core
///
/// Two layers:
///
/// - `StoreError`: failures surfaced by the document store adapter
///   (transport, permission, precondition). Propagated unchanged to
///   callers; the only place one is swallowed is the documented
///   index-not-ready fallback in the query helpers.
/// - `CoreError`: service-level failures. Wraps `StoreError` and adds
///   the domain conditions (task capacity, duplicate invitations,
///   settled invitations, exhausted compare-and-swap retries).
///
/// Absent entities are never errors on the read path: lookups return
/// `Ok(None)` and callers null-check.

use thiserror::Error;

/// Failures reported by a `DocumentStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network-level failure talking to the store.
    #[error("store transport failure: {0}")]
    Transport(String),

    /// The store rejected the caller's credentials or rules denied access.
    #[error("store permission denied: {0}")]
    PermissionDenied(String),

    /// A write referenced a document that does not exist.
    ///
    /// Read operations report absence as `Ok(None)`, never this variant.
    #[error("document {collection}/{id} does not exist")]
    NotFound { collection: String, id: String },

    /// A compound index required by the query has not finished building.
    ///
    /// Callers on the documented fallback paths catch this and redirect
    /// to a full scan with in-memory filtering.
    #[error("compound index not ready for query on '{collection}'")]
    IndexNotReady { collection: String },

    /// A conditional write lost a version race.
    #[error("version conflict on {collection}/{id}: expected {expected}, found {found}")]
    VersionConflict {
        collection: String,
        id: String,
        expected: u64,
        found: u64,
    },

    /// A stored document did not decode into the expected shape.
    #[error("malformed document {collection}/{id}: {reason}")]
    Malformed {
        collection: String,
        id: String,
        reason: String,
    },
}

/// Service-level result alias.
pub type CoreResult<T> = Result<T, CoreError>;

/// Failures reported by the user/project/task/invitation services.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A store operation failed; see `StoreError`.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The per-project task ceiling was hit before any write happened.
    ///
    /// Callers must surface this to the user and must not retry
    /// automatically.
    #[error("maximum of {limit} tasks reached for project {project_id}; delete tasks before adding more")]
    TaskLimitReached { project_id: String, limit: usize },

    /// A pending invitation for the same (project, invitee) pair already exists.
    #[error("a pending invitation for {invited_to} to project {project_id} already exists")]
    DuplicateInvitation {
        project_id: String,
        invited_to: String,
    },

    /// The invitation already reached a terminal state.
    #[error("invitation {id} was already {status}")]
    InvitationSettled { id: String, status: String },

    /// A membership compare-and-swap loop kept losing version races.
    #[error("membership update on project {project_id} lost {attempts} version races, giving up")]
    ConflictRetriesExhausted { project_id: String, attempts: u32 },

    /// Input failed validation before any store call was made.
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}
