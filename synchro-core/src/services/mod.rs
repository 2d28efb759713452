/// Domain services over the document store
///
/// Each service owns one collection and the operations against it:
///
/// - `users`: directory lookups with the timed cache
/// - `projects`: project CRUD and membership-map mutations
/// - `tasks`: task CRUD, the per-project ceiling, completion triggers
/// - `invitations`: the pending/accepted/declined lifecycle
///
/// Services share the query-with-fallback recovery path: when an
/// ordered-and-filtered query fails because its compound index is not
/// ready yet, the query is re-run as a full collection scan and the
/// filtering, ordering, and limit are applied in memory. Both paths
/// use the same predicate and comparator, so results are identical
/// apart from latency.

pub mod invitations;
pub mod projects;
pub mod tasks;
pub mod users;

pub use invitations::InvitationService;
pub use projects::ProjectService;
pub use tasks::{TaskService, MAX_TASKS_PER_PROJECT};
pub use users::UserDirectory;

use crate::error::StoreError;
use crate::store::{apply_in_memory, DocumentStore, Query, Record};

/// Runs `query`, falling back to a full scan with in-memory filtering
/// when the store reports the compound index is still building.
pub(crate) async fn query_with_fallback(
    store: &dyn DocumentStore,
    collection: &str,
    query: Query,
) -> Result<Vec<Record>, StoreError> {
    match store.query(collection, query.clone()).await {
        Ok(records) => Ok(records),
        Err(StoreError::IndexNotReady { .. }) => {
            tracing::warn!(
                collection,
                "compound index not ready, falling back to in-memory filtering"
            );
            let all = store.query(collection, Query::new()).await?;
            Ok(apply_in_memory(all, &query))
        }
        Err(e) => Err(e),
    }
}
