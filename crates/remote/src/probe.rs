//! Reachability probe against the replica's health endpoint.

use async_trait::async_trait;
use log::debug;
use std::time::Duration;

use wastehub_core::errors::{Error, Result};
use wastehub_core::store::ConnectivityProbe;

use crate::client::CONNECT_TIMEOUT_SECS;

/// Probe that issues a short-lived GET against `/health`.
///
/// Uses its own client so the probe's aggressive timeout never interferes
/// with regular API traffic.
pub struct HttpConnectivityProbe {
    client: reqwest::Client,
    health_url: String,
}

impl HttpConnectivityProbe {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|err| Error::Config(format!("could not build probe client: {}", err)))?;
        Ok(Self {
            client,
            health_url: format!("{}/health", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.health_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!("Connectivity probe failed: {}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{start_mock_server, MockOutcome};

    #[tokio::test]
    async fn healthy_endpoint_reports_reachable() {
        let (base_url, _requests, server) =
            start_mock_server(vec![MockOutcome::respond(200, r#"{"status":"ok"}"#)]).await;

        let probe = HttpConnectivityProbe::new(&base_url).unwrap();
        assert!(probe.is_reachable().await);
        server.abort();
    }

    #[tokio::test]
    async fn failing_endpoint_reports_unreachable() {
        let (base_url, _requests, server) =
            start_mock_server(vec![MockOutcome::respond(500, "{}")]).await;

        let probe = HttpConnectivityProbe::new(&base_url).unwrap();
        assert!(!probe.is_reachable().await);
        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_reports_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HttpConnectivityProbe::new(&format!("http://{}", addr)).unwrap();
        assert!(!probe.is_reachable().await);
    }
}
