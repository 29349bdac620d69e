//! Access tokens for Google API calls

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use super::metadata_server::MetadataClient;
use crate::error::ApiError;

/// Environment variable holding a pre-minted access token
pub const ACCESS_TOKEN_ENV: &str = "RUNBATCH_ACCESS_TOKEN";

/// Refresh cached tokens this long before they expire
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Source of OAuth2 bearer tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, ApiError>;
}

/// A fixed token, e.g. from `RUNBATCH_ACCESS_TOKEN`
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, ApiError> {
        Ok(self.0.clone())
    }
}

/// Tokens for the instance's (or function's) default service account
pub struct MetadataTokenSource {
    client: MetadataClient,
    cached: Mutex<Option<(String, Instant)>>,
}

impl MetadataTokenSource {
    pub fn new(client: MetadataClient) -> Self {
        Self {
            client,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<String, ApiError> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() + REFRESH_MARGIN < *expires_at {
                return Ok(token.clone());
            }
        }

        let fresh = self.client.access_token().await?;
        debug!(expires_in = fresh.expires_in, "fetched access token from metadata server");
        *cached = Some((
            fresh.access_token.clone(),
            Instant::now() + Duration::from_secs(fresh.expires_in),
        ));
        Ok(fresh.access_token)
    }
}

/// Tokens from the local gcloud installation, for workstation use
pub struct GcloudTokenSource;

#[async_trait]
impl TokenSource for GcloudTokenSource {
    async fn access_token(&self) -> Result<String, ApiError> {
        let output = Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .output()
            .await
            .map_err(|e| ApiError::Auth(format!("failed to run gcloud: {e}")))?;

        if !output.status.success() {
            return Err(ApiError::Auth(format!(
                "gcloud auth print-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(ApiError::Auth("gcloud returned an empty token".to_string()));
        }
        Ok(token)
    }
}

/// Pick a token source for the current environment
///
/// An explicit `RUNBATCH_ACCESS_TOKEN` wins. On Cloud Run / Cloud Functions
/// (`K_SERVICE` set) or when `GCE_METADATA_HOST` points somewhere, the
/// metadata server is used. Otherwise fall back to `gcloud`.
pub fn token_source_from_env() -> Arc<dyn TokenSource> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        if !token.is_empty() {
            return Arc::new(StaticToken(token));
        }
    }
    if std::env::var_os("K_SERVICE").is_some() || std::env::var_os("GCE_METADATA_HOST").is_some() {
        return Arc::new(MetadataTokenSource::new(MetadataClient::from_env()));
    }
    Arc::new(GcloudTokenSource)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticToken("ya29.test".to_string());
        assert_eq!(source.access_token().await.unwrap(), "ya29.test");
    }
}
