//! HTTP plumbing shared by every Cloudian admin API call.

use crate::cloudian::secret::Secret;
use crate::error::{Error, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a Cloudian admin API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Admin API base URL, e.g. `https://cloudian-admin:19443`
    pub base_url: String,
    /// Value sent verbatim as the `Authorization` header
    pub auth_header: Secret,
    /// Upper bound for each request, connect to last body byte
    pub timeout: Duration,
    /// Skip verification of the server certificate
    pub insecure_skip_tls_verify: bool,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, auth_header: impl Into<Secret>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_header: auth_header.into(),
            ..Default::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:19443".to_string(),
            auth_header: Secret::default(),
            timeout: Duration::from_secs(30),
            insecure_skip_tls_verify: false,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Client for the Cloudian HyperStore admin REST API.
///
/// Holds only immutable state, so a single instance can be cloned and shared
/// between concurrent reconciles.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    auth_header: Secret,
    http: reqwest::Client,
}

impl Client {
    /// Create a new client
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify)
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header: config.auth_header,
            http,
        })
    }

    /// Start a request against `path` with the headers every call carries.
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, self.auth_header.reveal())
    }

    /// Send a request and map its status: 200/201 pass, 204 is
    /// [`Error::NotFound`], anything else is [`Error::UnexpectedStatus`].
    pub(crate) async fn send(&self, request: RequestBuilder, operation: &str) -> Result<Response> {
        debug!(operation, "Calling Cloudian admin API");

        let response = request.send().await.map_err(|source| Error::Transport {
            operation: operation.to_string(),
            source,
        })?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(response),
            StatusCode::NO_CONTENT => Err(Error::NotFound),
            status => {
                // Best effort, the status alone still reports the failure
                let message = response.text().await.unwrap_or_default();
                Err(Error::UnexpectedStatus {
                    operation: operation.to_string(),
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Send a request whose response body is irrelevant.
    pub(crate) async fn execute(&self, request: RequestBuilder, operation: &str) -> Result<()> {
        let response = self.send(request, operation).await?;
        // Drain the body so the connection returns to the pool
        response.bytes().await.map_err(|source| Error::Transport {
            operation: operation.to_string(),
            source,
        })?;
        Ok(())
    }

    /// Send a request and decode its JSON body.
    pub(crate) async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T> {
        let response = self.send(request, operation).await?;
        let body = response.bytes().await.map_err(|source| Error::Transport {
            operation: operation.to_string(),
            source,
        })?;

        serde_json::from_slice(&body).map_err(|source| Error::Decode {
            operation: operation.to_string(),
            source,
        })
    }
}

/// Encode a request body up front, so encoding failures carry the operation.
pub(crate) fn encode<T: Serialize>(body: &T, operation: &str) -> Result<Vec<u8>> {
    serde_json::to_vec(body).map_err(|source| Error::Encode {
        operation: operation.to_string(),
        source,
    })
}
