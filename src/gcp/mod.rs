//! Google Cloud REST clients
//!
//! Thin reqwest wrappers for the handful of endpoints this tool touches:
//!
//! - `auth` - access tokens (metadata server, gcloud, or a fixed token)
//! - `metadata_server` - instance identity and attributes from inside the VM
//! - `compute` - create and delete instances
//! - `secrets` - Secret Manager payload access
//! - `logging` - Cloud Logging entry writes for the job log

pub mod auth;
pub mod compute;
pub mod logging;
pub mod metadata_server;
pub mod secrets;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use auth::TokenSource;

pub use auth::{token_source_from_env, GcloudTokenSource, MetadataTokenSource, StaticToken};
pub use compute::{ComputeClient, ComputeReaper};
pub use logging::CloudLogging;
pub use metadata_server::{InstanceInfo, MetadataClient};
pub use secrets::SecretManager;

/// Per-request timeout for Google API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Authenticated JSON client shared by the API wrappers
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl ApiClient {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
        }
    }

    pub async fn get(&self, url: &str) -> Result<Value, ApiError> {
        self.send(Method::GET, url, None).await
    }

    pub async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Value, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.send(Method::POST, url, Some(body)).await
    }

    pub async fn delete(&self, url: &str) -> Result<Value, ApiError> {
        self.send(Method::DELETE, url, None).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let token = self.tokens.access_token().await?;

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|source| ApiError::Http {
            url: url.to_string(),
            source,
        })?;
        read_json(url, response).await
    }
}

/// Turn a response into JSON, mapping non-2xx statuses to [`ApiError::Status`]
pub(crate) async fn read_json(url: &str, response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    let text = response.text().await.map_err(|source| ApiError::Http {
        url: url.to_string(),
        source,
    })?;

    if !status.is_success() {
        return Err(ApiError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body: text.trim().to_string(),
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
