//! Secret Manager access

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;

use super::ApiClient;
use crate::bootstrap::{BoxError, SecretStore};

/// Default Secret Manager v1 endpoint
pub const SECRET_MANAGER_BASE_URL: &str = "https://secretmanager.googleapis.com/v1";

#[derive(Deserialize)]
struct AccessResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    /// base64-encoded secret bytes
    data: String,
}

/// Resolves `projects/*/secrets/*/versions/*` references
#[derive(Clone)]
pub struct SecretManager {
    api: ApiClient,
    base_url: String,
}

impl SecretManager {
    pub fn new(api: ApiClient) -> Self {
        Self::with_base_url(api, SECRET_MANAGER_BASE_URL)
    }

    pub fn with_base_url(api: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            api,
            base_url: base_url.into(),
        }
    }
}

/// Decode the `payload.data` field of an access response
fn decode_payload(response: serde_json::Value) -> Result<String, BoxError> {
    let response: AccessResponse = serde_json::from_value(response)?;
    let bytes = STANDARD.decode(response.payload.data.as_bytes())?;
    Ok(String::from_utf8(bytes)?)
}

#[async_trait]
impl SecretStore for SecretManager {
    async fn access(&self, reference: &str) -> Result<String, BoxError> {
        let url = format!("{}/{}:access", self.base_url, reference);
        let response = self.api.get(&url).await?;
        decode_payload(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_payload() {
        let data = STANDARD.encode(r#"{"DB_PASSWORD":"hunter2"}"#);
        let response = json!({
            "name": "projects/1/secrets/db/versions/3",
            "payload": {"data": data, "dataCrc32c": "123"}
        });
        assert_eq!(decode_payload(response).unwrap(), r#"{"DB_PASSWORD":"hunter2"}"#);
    }

    #[test]
    fn test_decode_payload_rejects_garbage() {
        assert!(decode_payload(json!({"payload": {"data": "%%%"}})).is_err());
        assert!(decode_payload(json!({"name": "x"})).is_err());
    }
}
