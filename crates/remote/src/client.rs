//! HTTP client for the central replica's document API.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use wastehub_core::errors::{Error, Result};
use wastehub_core::store::{DocumentStore, Filter, WriteOutcome};

/// Overall request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Connection establishment timeout. Kept short so a dead link fails a sync
/// cycle quickly instead of hanging it.
pub(crate) const CONNECT_TIMEOUT_SECS: u64 = 5;
const MAX_LOG_BODY_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    documents: Vec<Value>,
}

fn log_response(status: reqwest::StatusCode, body: &str) {
    if status.is_success() {
        debug!("Replica response status: {}", status);
        return;
    }
    let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
    if body.chars().count() > MAX_LOG_BODY_CHARS {
        preview.push_str("...");
    }
    debug!("Replica response error ({}): {}", status, preview);
}

pub(crate) fn transport_err(err: reqwest::Error) -> Error {
    Error::remote_transport(err.to_string())
}

/// Parse a JSON response body, surfacing non-success statuses as remote
/// errors carrying the HTTP status.
async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(transport_err)?;
    log_response(status, &body);

    if !status.is_success() {
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
            return Err(Error::remote(
                status.as_u16(),
                format!("{}: {}", error.code, error.message),
            ));
        }
        return Err(Error::remote(
            status.as_u16(),
            format!("request failed: {}", body),
        ));
    }

    serde_json::from_str(&body).map_err(|err| {
        Error::remote(
            status.as_u16(),
            format!("could not parse response: {}", err),
        )
    })
}

/// [`DocumentStore`] implementation speaking to the replica's collection
/// endpoints. Filters are shipped as JSON and evaluated server-side, so the
/// query surface stays identical to the local adapter's.
#[derive(Debug, Clone)]
pub struct RemoteStoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteStoreClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|err| Error::Config(format!("could not build HTTP client: {}", err)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str, action: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.base_url, collection, action
        )
    }
}

#[async_trait]
impl DocumentStore for RemoteStoreClient {
    /// POST /api/v1/collections/{collection}/query
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        let response = self
            .client
            .post(self.collection_url(collection, "query"))
            .json(&json!({"filter": filter}))
            .send()
            .await
            .map_err(transport_err)?;
        let parsed: QueryResponse = parse_response(response).await?;
        Ok(parsed.documents)
    }

    /// POST /api/v1/collections/{collection}/query with `limit: 1`.
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let response = self
            .client
            .post(self.collection_url(collection, "query"))
            .json(&json!({"filter": filter, "limit": 1}))
            .send()
            .await
            .map_err(transport_err)?;
        let parsed: QueryResponse = parse_response(response).await?;
        Ok(parsed.documents.into_iter().next())
    }

    /// POST /api/v1/collections/{collection}/documents
    async fn insert(&self, collection: &str, document: &Value) -> Result<()> {
        let response = self
            .client
            .post(self.collection_url(collection, "documents"))
            .json(document)
            .send()
            .await
            .map_err(transport_err)?;
        // The body is an acknowledgment we have no further use for; parsing
        // it still folds HTTP failures into remote errors.
        let _: Value = parse_response(response).await?;
        Ok(())
    }

    /// POST /api/v1/collections/{collection}/update
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Value,
    ) -> Result<WriteOutcome> {
        let response = self
            .client
            .post(self.collection_url(collection, "update"))
            .json(&json!({"filter": filter, "patch": patch}))
            .send()
            .await
            .map_err(transport_err)?;
        parse_response(response).await
    }

    /// POST /api/v1/collections/{collection}/delete
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<WriteOutcome> {
        let response = self
            .client
            .post(self.collection_url(collection, "delete"))
            .json(&json!({"filter": filter}))
            .send()
            .await
            .map_err(transport_err)?;
        parse_response(response).await
    }
}
