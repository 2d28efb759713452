/// Document store adapter
///
/// This module defines the contract for the remote document database
/// holding the `users`, `projects`, `tasks`, `invitations`, and
/// `notifications` collections, plus the shared query-evaluation
/// helpers both backends and the fallback paths rely on.
///
/// # Adapter Contract
///
/// All backends must:
/// 1. Implement the `DocumentStore` trait (async)
/// 2. Assign ids and `createdAt`/`updatedAt` stamps server-side
/// 3. Keep timestamps in the store-native `Timestamp` type; services
///    convert to `chrono` dates at their boundary, never the adapter
/// 4. Surface precondition failures through the `StoreError` taxonomy
///    unchanged; no retries at this layer
///
/// # Queries
///
/// A `Query` carries equality, presence, and prefix filters, an
/// optional single-field ordering, and an optional limit. A query that
/// orders on one field while filtering on another needs a compound
/// index; backends report an unbuilt index as
/// `StoreError::IndexNotReady`, which the service-layer fallback
/// helper turns into a full scan with in-memory filtering through
/// `apply_in_memory` below. Using the same evaluation code on both
/// paths is what makes the fallback functionally equivalent.
///
/// # Example
///
/// ```no_run
/// use synchro_core::store::{collections, DocumentStore, Filter, Query};
/// use synchro_core::store::memory::MemoryStore;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), synchro_core::error::StoreError> {
/// let store = MemoryStore::new();
///
/// let record = store
///     .insert(collections::USERS, json!({"email": "alice@example.com"}))
///     .await?;
///
/// let hits = store
///     .query(
///         collections::USERS,
///         Query::new().filter(Filter::eq("email", "alice@example.com")),
///     )
///     .await?;
/// assert_eq!(hits[0].id, record.id);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

use crate::error::StoreError;

pub mod http;
pub mod memory;

/// Collection names persisted by this core.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PROJECTS: &str = "projects";
    pub const TASKS: &str = "tasks";
    pub const INVITATIONS: &str = "invitations";
    pub const NOTIFICATIONS: &str = "notifications";
}

/// Store-native temporal type.
///
/// Services convert to `chrono::DateTime<Utc>` via `to_datetime` on
/// every read; the adapter itself never converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub seconds: i64,

    /// Sub-second nanoseconds.
    pub nanos: u32,
}

impl Timestamp {
    /// Converts a language-native date into the store representation.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Timestamp {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos(),
        }
    }

    /// Converts to a language-native date.
    ///
    /// Out-of-range values clamp to the epoch rather than failing a
    /// read path over a single corrupt stamp.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.seconds, self.nanos)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// A stored document plus its server-managed envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Server-assigned document id.
    pub id: String,

    /// Monotonic per-document version, bumped on every write.
    ///
    /// Passing it back as `expected_version` on `update` turns the
    /// write into a compare-and-swap.
    pub version: u64,

    /// Server-assigned creation stamp.
    pub created_at: Timestamp,

    /// Server-assigned stamp of the last write.
    pub updated_at: Timestamp,

    /// The document body (camelCase JSON object).
    pub data: JsonValue,
}

/// A single field predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Filter {
    /// Field equals the given value exactly.
    #[serde(rename_all = "camelCase")]
    Eq { field: String, value: JsonValue },

    /// Field exists and is non-null. Used for dynamic map keys such as
    /// `teamMembers.<uid>`.
    #[serde(rename_all = "camelCase")]
    FieldPresent { field: String },

    /// String field starts with the given prefix (a bounded range scan).
    #[serde(rename_all = "camelCase")]
    Prefix { field: String, prefix: String },
}

impl Filter {
    /// Equality filter.
    pub fn eq(field: &str, value: impl Into<JsonValue>) -> Self {
        Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    /// Presence filter on a (possibly dotted) field path.
    pub fn present(field: &str) -> Self {
        Filter::FieldPresent {
            field: field.to_string(),
        }
    }

    /// Prefix filter on a string field.
    pub fn prefix(field: &str, prefix: &str) -> Self {
        Filter::Prefix {
            field: field.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// The field path this filter constrains.
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq { field, .. } => field,
            Filter::FieldPresent { field } => field,
            Filter::Prefix { field, .. } => field,
        }
    }

    /// Evaluates the filter against a record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Eq { field, value } => lookup(record, field) == Some(value),
            Filter::FieldPresent { field } => {
                lookup(record, field).map_or(false, |v| !v.is_null())
            }
            Filter::Prefix { field, prefix } => lookup(record, field)
                .and_then(JsonValue::as_str)
                .map_or(false, |s| s.starts_with(prefix.as_str())),
        }
    }
}

/// Single-field ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    /// Field path to order on (`createdAt` and `updatedAt` address the
    /// envelope stamps).
    pub field: String,

    /// Descending when true.
    pub descending: bool,
}

/// A typed multi-field query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Conjunctive filters.
    #[serde(default)]
    pub filters: Vec<Filter>,

    /// Optional ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderBy>,

    /// Optional result cap, applied after filtering and ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    /// An unconstrained query (full collection scan).
    pub fn new() -> Self {
        Query::default()
    }

    /// Adds a filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets the ordering.
    pub fn order_by(mut self, field: &str, descending: bool) -> Self {
        self.order = Some(OrderBy {
            field: field.to_string(),
            descending,
        });
        self
    }

    /// Caps the result set.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when satisfying this query requires a compound index:
    /// ordering on one field while filtering on another.
    pub fn needs_compound_index(&self) -> bool {
        match &self.order {
            Some(order) => self.filters.iter().any(|f| f.field() != order.field),
            None => false,
        }
    }
}

/// Typed access to the remote document database.
///
/// All writes stamp `updatedAt` with a server-assigned time; inserts
/// additionally stamp `createdAt`. Any call may fail with a
/// `StoreError`, which is propagated unchanged to the caller.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a document; the store assigns id and timestamps.
    async fn insert(&self, collection: &str, data: JsonValue) -> Result<Record, StoreError>;

    /// Inserts a document under a caller-chosen id (profiles are keyed
    /// by the auth uid). Fails with `VersionConflict` when the id is
    /// already taken.
    async fn insert_with_id(
        &self,
        collection: &str,
        id: &str,
        data: JsonValue,
    ) -> Result<Record, StoreError>;

    /// Fetches a document by id. Absence is `Ok(None)`.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError>;

    /// Runs a typed query against a collection.
    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Record>, StoreError>;

    /// Shallow-merges `patch` into the document and restamps `updatedAt`.
    ///
    /// When `expected_version` is set the write only lands if the
    /// document still carries that version, otherwise
    /// `StoreError::VersionConflict` is returned. `None` keeps the
    /// store's last-write-wins semantics.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: JsonValue,
        expected_version: Option<u64>,
    ) -> Result<Record, StoreError>;

    /// Deletes a document. Deleting an absent id is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

/// Resolves a dotted field path inside a record's document body.
pub fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a JsonValue> {
    let mut current = &record.data;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Applies a query's filters, ordering, and limit in memory.
///
/// This is the fallback half of every query-with-fallback pair; the
/// in-memory backend uses the same functions for its primary path, so
/// both paths return the identical set in the identical order.
pub fn apply_in_memory(mut records: Vec<Record>, query: &Query) -> Vec<Record> {
    records.retain(|r| query.filters.iter().all(|f| f.matches(r)));
    if let Some(order) = &query.order {
        sort_records(&mut records, order);
    }
    if let Some(limit) = query.limit {
        records.truncate(limit);
    }
    records
}

/// Sorts records by a single field, ties broken by id for determinism.
pub fn sort_records(records: &mut [Record], order: &OrderBy) {
    records.sort_by(|a, b| {
        let ordering = compare_field(a, b, &order.field);
        let ordering = if order.descending {
            ordering.reverse()
        } else {
            ordering
        };
        ordering.then_with(|| a.id.cmp(&b.id))
    });
}

fn compare_field(a: &Record, b: &Record, field: &str) -> Ordering {
    match field {
        "createdAt" => a.created_at.cmp(&b.created_at),
        "updatedAt" => a.updated_at.cmp(&b.updated_at),
        _ => json_cmp(lookup(a, field), lookup(b, field)),
    }
}

/// Total order over optional JSON values: absent < null < bool <
/// number < string < composite, each rank compared internally.
fn json_cmp(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
            (JsonValue::Number(x), JsonValue::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
            _ => json_rank(a)
                .cmp(&json_rank(b))
                .then_with(|| a.to_string().cmp(&b.to_string())),
        },
    }
}

fn json_rank(value: &JsonValue) -> u8 {
    match value {
        JsonValue::Null => 0,
        JsonValue::Bool(_) => 1,
        JsonValue::Number(_) => 2,
        JsonValue::String(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Object(_) => 5,
    }
}
