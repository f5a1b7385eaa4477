//! Object storage client for image offload.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::time::Duration;

use wastehub_core::errors::{Error, Result};
use wastehub_core::store::ObjectStore;

use crate::client::{transport_err, CONNECT_TIMEOUT_SECS};

/// Images are small (kiosk camera stills), but uploads over a flaky uplink
/// still deserve a more generous budget than the document API gets.
const UPLOAD_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct UploadErrorResponse {
    message: String,
}

/// Uploads objects via the replica's object gateway.
///
/// PUT /api/v1/objects/{namespace}/{key}
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|err| Error::Config(format!("could not build upload client: {}", err)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        namespace: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let url = format!("{}/api/v1/objects/{}/{}", self.base_url, namespace, key);
        debug!("Uploading {} bytes to {}", bytes.len(), url);

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_err)?;
        if !status.is_success() {
            let message = serde_json::from_str::<UploadErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(Error::remote(status.as_u16(), message));
        }

        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|err| Error::remote(status.as_u16(), format!("bad upload response: {}", err)))?;
        Ok(parsed.url)
    }
}
