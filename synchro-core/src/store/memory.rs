/// In-process document store backend
///
/// This backend exists for tests and demos: it implements the full
/// `DocumentStore` contract against process memory, with the handful
/// of behaviors the services depend on faithfully reproduced:
///
/// - server-assigned ids and strictly monotonic timestamps (two
///   inserts never share a `createdAt`, matching a real server's
///   commit order)
/// - per-document versions and compare-and-swap updates
/// - compound-index readiness switches, so tests can simulate a fresh
///   deployment whose indexes are still building and exercise the
///   full-scan fallback paths
/// - operation counters, so tests can assert how many round trips a
///   cached lookup actually performed
///
/// # Example
///
/// ```no_run
/// use synchro_core::store::memory::MemoryStore;
/// use synchro_core::store::{collections, DocumentStore};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), synchro_core::error::StoreError> {
/// let store = MemoryStore::new();
/// // Simulate a deployment whose project indexes are still building.
/// store.set_compound_index_ready(collections::PROJECTS, false);
///
/// let record = store.insert(collections::PROJECTS, json!({"projectName": "Apollo"})).await?;
/// assert_eq!(store.op_counts().inserts, 1);
/// # let _ = record;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{apply_in_memory, DocumentStore, Query, Record, Timestamp};

/// Counts of operations performed against a `MemoryStore`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub inserts: u64,
    pub gets: u64,
    pub queries: u64,
    pub updates: u64,
    pub deletes: u64,
}

/// In-memory `DocumentStore` backend.
pub struct MemoryStore {
    collections: Mutex<HashMap<String, HashMap<String, Record>>>,

    // Collections whose compound indexes are still building.
    unready_indexes: Mutex<HashSet<String>>,

    // Last issued server timestamp, for monotonicity.
    last_stamp: Mutex<Timestamp>,

    inserts: AtomicU64,
    gets: AtomicU64,
    queries: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store with every compound index ready.
    pub fn new() -> Self {
        MemoryStore {
            collections: Mutex::new(HashMap::new()),
            unready_indexes: Mutex::new(HashSet::new()),
            last_stamp: Mutex::new(Timestamp { seconds: 0, nanos: 0 }),
            inserts: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Marks a collection's compound indexes as ready or still building.
    ///
    /// While not ready, any query needing a compound index fails with
    /// `StoreError::IndexNotReady`; plain scans and single-field
    /// queries keep working, as they do on a real deployment.
    pub fn set_compound_index_ready(&self, collection: &str, ready: bool) {
        let mut unready = self.unready_indexes.lock().unwrap_or_else(|e| e.into_inner());
        if ready {
            unready.remove(collection);
        } else {
            unready.insert(collection.to_string());
        }
    }

    /// Snapshot of the operation counters.
    pub fn op_counts(&self) -> OpCounts {
        OpCounts {
            inserts: self.inserts.load(AtomicOrdering::Relaxed),
            gets: self.gets.load(AtomicOrdering::Relaxed),
            queries: self.queries.load(AtomicOrdering::Relaxed),
            updates: self.updates.load(AtomicOrdering::Relaxed),
            deletes: self.deletes.load(AtomicOrdering::Relaxed),
        }
    }

    /// Number of documents currently stored in a collection.
    pub fn collection_len(&self, collection: &str) -> usize {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections.get(collection).map_or(0, HashMap::len)
    }

    // Issues a server timestamp strictly after every previous one.
    fn server_now(&self) -> Timestamp {
        let mut last = self.last_stamp.lock().unwrap_or_else(|e| e.into_inner());
        let mut now = Timestamp::from_datetime(Utc::now());
        if now <= *last {
            now = tick(*last);
        }
        *last = now;
        now
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

// Advances a timestamp by one microsecond, carrying into seconds.
fn tick(ts: Timestamp) -> Timestamp {
    let nanos = ts.nanos + 1_000;
    if nanos >= 1_000_000_000 {
        Timestamp {
            seconds: ts.seconds + 1,
            nanos: nanos - 1_000_000_000,
        }
    } else {
        Timestamp {
            seconds: ts.seconds,
            nanos,
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, data: JsonValue) -> Result<Record, StoreError> {
        self.inserts.fetch_add(1, AtomicOrdering::Relaxed);
        let now = self.server_now();
        let record = Record {
            id: Uuid::new_v4().to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            data,
        };

        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn insert_with_id(
        &self,
        collection: &str,
        id: &str,
        data: JsonValue,
    ) -> Result<Record, StoreError> {
        self.inserts.fetch_add(1, AtomicOrdering::Relaxed);
        let now = self.server_now();

        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let docs = collections.entry(collection.to_string()).or_default();
        if let Some(existing) = docs.get(id) {
            return Err(StoreError::VersionConflict {
                collection: collection.to_string(),
                id: id.to_string(),
                expected: 0,
                found: existing.version,
            });
        }

        let record = Record {
            id: id.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            data,
        };
        docs.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        self.gets.fetch_add(1, AtomicOrdering::Relaxed);
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Record>, StoreError> {
        self.queries.fetch_add(1, AtomicOrdering::Relaxed);

        if query.needs_compound_index() {
            let unready = self.unready_indexes.lock().unwrap_or_else(|e| e.into_inner());
            if unready.contains(collection) {
                return Err(StoreError::IndexNotReady {
                    collection: collection.to_string(),
                });
            }
        }

        let records: Vec<Record> = {
            let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
            collections
                .get(collection)
                .map(|docs| docs.values().cloned().collect())
                .unwrap_or_default()
        };

        let mut results = apply_in_memory(records, &query);
        if query.order.is_none() {
            // Stable default order for unordered scans.
            results.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }
        Ok(results)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: JsonValue,
        expected_version: Option<u64>,
    ) -> Result<Record, StoreError> {
        self.updates.fetch_add(1, AtomicOrdering::Relaxed);
        let now = self.server_now();

        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let record = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        if let Some(expected) = expected_version {
            if record.version != expected {
                return Err(StoreError::VersionConflict {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    expected,
                    found: record.version,
                });
            }
        }

        if let (Some(target), Some(fields)) = (record.data.as_object_mut(), patch.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        record.version += 1;
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, AtomicOrdering::Relaxed);
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{collections, Filter};
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_assigns_id_and_stamps() {
        let store = MemoryStore::new();
        let a = store
            .insert(collections::TASKS, json!({"title": "one"}))
            .await
            .unwrap();
        let b = store
            .insert(collections::TASKS, json!({"title": "two"}))
            .await
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.version, 1);
        // Server timestamps are strictly monotonic.
        assert!(a.created_at < b.created_at);
    }

    #[tokio::test]
    async fn test_insert_with_id_rejects_duplicates() {
        let store = MemoryStore::new();
        store
            .insert_with_id(collections::USERS, "u1", json!({"email": "a@b.c"}))
            .await
            .unwrap();
        let err = store
            .insert_with_id(collections::USERS, "u1", json!({"email": "x@y.z"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
        assert_eq!(store.collection_len(collections::USERS), 1);
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing() {
        let store = MemoryStore::new();
        assert!(store.get(collections::TASKS, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_merges_and_bumps_version() {
        let store = MemoryStore::new();
        let r = store
            .insert(collections::TASKS, json!({"title": "t", "status": "To Do"}))
            .await
            .unwrap();

        let updated = store
            .update(collections::TASKS, &r.id, json!({"status": "Done"}), None)
            .await
            .unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.data["title"], "t");
        assert_eq!(updated.data["status"], "Done");
        assert!(updated.updated_at > r.updated_at);
        assert_eq!(updated.created_at, r.created_at);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(collections::TASKS, "nope", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_compare_and_swap_detects_conflicts() {
        let store = MemoryStore::new();
        let r = store
            .insert(collections::PROJECTS, json!({"projectName": "p"}))
            .await
            .unwrap();

        // Concurrent writer lands first.
        store
            .update(collections::PROJECTS, &r.id, json!({"goal": "x"}), Some(1))
            .await
            .unwrap();

        let err = store
            .update(collections::PROJECTS, &r.id, json!({"goal": "y"}), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        let r = store
            .insert(collections::TASKS, json!({"title": "t"}))
            .await
            .unwrap();
        store.delete(collections::TASKS, &r.id).await.unwrap();
        store.delete(collections::TASKS, &r.id).await.unwrap();
        assert_eq!(store.collection_len(collections::TASKS), 0);
    }

    #[tokio::test]
    async fn test_unready_compound_index_fails_ordered_query() {
        let store = MemoryStore::new();
        store.set_compound_index_ready(collections::TASKS, false);
        store
            .insert(collections::TASKS, json!({"projectId": "p1"}))
            .await
            .unwrap();

        let compound = Query::new()
            .filter(Filter::eq("projectId", "p1"))
            .order_by("createdAt", true);
        let err = store.query(collections::TASKS, compound).await.unwrap_err();
        assert!(matches!(err, StoreError::IndexNotReady { .. }));

        // A plain scan still works while the index builds.
        let all = store.query(collections::TASKS, Query::new()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_op_counts() {
        let store = MemoryStore::new();
        let r = store
            .insert(collections::USERS, json!({"email": "a@b.c"}))
            .await
            .unwrap();
        store.get(collections::USERS, &r.id).await.unwrap();
        store.query(collections::USERS, Query::new()).await.unwrap();

        let counts = store.op_counts();
        assert_eq!(counts.inserts, 1);
        assert_eq!(counts.gets, 1);
        assert_eq!(counts.queries, 1);
    }

    #[test]
    fn test_tick_carries_into_seconds() {
        let ts = Timestamp {
            seconds: 5,
            nanos: 999_999_500,
        };
        let next = tick(ts);
        assert_eq!(next.seconds, 6);
        assert_eq!(next.nanos, 500);
    }
}
