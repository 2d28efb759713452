/// HTTP document store backend
///
/// Talks to the remote document database over a small JSON contract:
///
/// - `POST   {base}/v1/{collection}`            insert, body `{"data": ...}`
/// - `PUT    {base}/v1/{collection}/{id}`       insert under a chosen id
/// - `GET    {base}/v1/{collection}/{id}`       fetch one
/// - `POST   {base}/v1/{collection}:query`      run a `Query`
/// - `PATCH  {base}/v1/{collection}/{id}`       merge patch, optional CAS
/// - `DELETE {base}/v1/{collection}/{id}`       delete
///
/// Status mapping onto the `StoreError` taxonomy:
///
/// - `401`/`403` -> `PermissionDenied`
/// - `404` -> `Ok(None)` on reads, `NotFound` on writes
/// - `409` -> `VersionConflict` (body carries expected/found)
/// - `412` -> `IndexNotReady` (index still building server-side)
/// - anything else non-2xx, or a transport failure -> `Transport`
///
/// No retries here; the service layer owns all recovery.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::StoreError;
use crate::store::{DocumentStore, Query, Record};

/// `DocumentStore` backend over HTTP.
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    records: Vec<Record>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    expected: Option<u64>,
    #[serde(default)]
    found: Option<u64>,
}

impl HttpStore {
    /// Creates a backend rooted at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpStore {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    /// Attaches a bearer token sent with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/v1/{}", self.base_url, collection)
    }

    fn doc_url(&self, collection: &str, id: &str) -> String {
        format!("{}/v1/{}/{}", self.base_url, collection, id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    // Maps a non-2xx response onto the error taxonomy.
    async fn into_error(
        response: reqwest::Response,
        collection: &str,
        id: &str,
    ) -> StoreError {
        let status = response.status();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        let message = body.message.unwrap_or_else(|| status.to_string());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                StoreError::PermissionDenied(message)
            }
            StatusCode::NOT_FOUND => StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            },
            StatusCode::CONFLICT => StoreError::VersionConflict {
                collection: collection.to_string(),
                id: id.to_string(),
                expected: body.expected.unwrap_or(0),
                found: body.found.unwrap_or(0),
            },
            StatusCode::PRECONDITION_FAILED => StoreError::IndexNotReady {
                collection: collection.to_string(),
            },
            _ => StoreError::Transport(format!("{}: {}", status, message)),
        }
    }

    async fn parse_record(response: reqwest::Response) -> Result<Record, StoreError> {
        response
            .json::<Record>()
            .await
            .map_err(|e| StoreError::Transport(format!("invalid record body: {}", e)))
    }
}

#[async_trait::async_trait]
impl DocumentStore for HttpStore {
    async fn insert(&self, collection: &str, data: JsonValue) -> Result<Record, StoreError> {
        let response = self
            .execute(
                self.client
                    .post(self.collection_url(collection))
                    .json(&json!({ "data": data })),
            )
            .await?;

        if response.status().is_success() {
            Self::parse_record(response).await
        } else {
            Err(Self::into_error(response, collection, "-").await)
        }
    }

    async fn insert_with_id(
        &self,
        collection: &str,
        id: &str,
        data: JsonValue,
    ) -> Result<Record, StoreError> {
        let response = self
            .execute(
                self.client
                    .put(self.doc_url(collection, id))
                    .json(&json!({ "data": data })),
            )
            .await?;

        if response.status().is_success() {
            Self::parse_record(response).await
        } else {
            Err(Self::into_error(response, collection, id).await)
        }
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let response = self
            .execute(self.client.get(self.doc_url(collection, id)))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(Self::parse_record(response).await?)),
            _ => Err(Self::into_error(response, collection, id).await),
        }
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Record>, StoreError> {
        let response = self
            .execute(
                self.client
                    .post(format!("{}:query", self.collection_url(collection)))
                    .json(&query),
            )
            .await?;

        if response.status().is_success() {
            let body: QueryResponse = response
                .json()
                .await
                .map_err(|e| StoreError::Transport(format!("invalid query body: {}", e)))?;
            Ok(body.records)
        } else {
            Err(Self::into_error(response, collection, "-").await)
        }
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: JsonValue,
        expected_version: Option<u64>,
    ) -> Result<Record, StoreError> {
        let response = self
            .execute(
                self.client
                    .patch(self.doc_url(collection, id))
                    .json(&json!({ "patch": patch, "expectedVersion": expected_version })),
            )
            .await?;

        if response.status().is_success() {
            Self::parse_record(response).await
        } else {
            Err(Self::into_error(response, collection, id).await)
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let response = self
            .execute(self.client.delete(self.doc_url(collection, id)))
            .await?;

        match response.status() {
            // Deleting an absent document is not an error.
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(Self::into_error(response, collection, id).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_shapes() {
        let store = HttpStore::new("http://store.internal");
        assert_eq!(
            store.collection_url("tasks"),
            "http://store.internal/v1/tasks"
        );
        assert_eq!(
            store.doc_url("tasks", "t1"),
            "http://store.internal/v1/tasks/t1"
        );
    }

    #[test]
    fn test_error_body_tolerates_missing_fields() {
        let body: ErrorBody = serde_json::from_str("{}").unwrap();
        assert!(body.message.is_none());
        assert!(body.expected.is_none());
        assert!(body.found.is_none());
    }
}
