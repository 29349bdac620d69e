//! GCE metadata server client
//!
//! Used inside the VM to learn who we are (project, zone, instance name), to
//! read the configuration channel attributes, and to mint access tokens for
//! the instance service account.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use super::read_json;
use crate::error::ApiError;

/// Default metadata endpoint
pub const METADATA_BASE_URL: &str = "http://metadata.google.internal/computeMetadata/v1";

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Token response from `instance/service-accounts/default/token`
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

/// Identity and attributes of the running instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub project_id: String,
    pub zone: String,
    pub instance_name: String,
    pub attributes: HashMap<String, String>,
}

#[derive(Deserialize)]
struct MetadataTree {
    instance: InstanceTree,
    project: ProjectTree,
}

#[derive(Deserialize)]
struct InstanceTree {
    name: String,
    /// `projects/<number>/zones/<zone>`
    zone: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectTree {
    project_id: String,
}

impl InstanceInfo {
    /// Parse the document returned by `?recursive=true`
    pub fn from_tree(tree: Value) -> Result<Self, serde_json::Error> {
        let tree: MetadataTree = serde_json::from_value(tree)?;
        let zone = tree
            .instance
            .zone
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(InstanceInfo {
            project_id: tree.project.project_id,
            zone,
            instance_name: tree.instance.name,
            attributes: tree.instance.attributes,
        })
    }
}

/// Client for the metadata server
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Honour `GCE_METADATA_HOST` like the Google client libraries do
    pub fn from_env() -> Self {
        match std::env::var("GCE_METADATA_HOST") {
            Ok(host) if !host.is_empty() => Self::new(format!("http://{host}/computeMetadata/v1")),
            _ => Self::new(METADATA_BASE_URL),
        }
    }

    async fn get(&self, path: &str) -> Result<Value, ApiError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .map_err(|source| ApiError::Http {
                url: url.clone(),
                source,
            })?;
        read_json(&url, response).await
    }

    /// Mint a token for the default service account
    pub async fn access_token(&self) -> Result<AccessToken, ApiError> {
        let path = "instance/service-accounts/default/token";
        let value = self.get(path).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::Auth(format!("bad token response: {e}")))
    }

    /// Read the whole instance and project tree
    pub async fn instance_info(&self) -> Result<InstanceInfo, ApiError> {
        let path = "?recursive=true";
        let value = self.get(path).await?;
        InstanceInfo::from_tree(value).map_err(|e| ApiError::Decode {
            url: format!("{}/{}", self.base_url, path),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_instance_info_from_tree() {
        let tree = json!({
            "instance": {
                "name": "runbatch-0a1b2c3d4e5f",
                "zone": "projects/123456789/zones/us-central1-a",
                "attributes": {
                    "runbatch-image": "busybox",
                    "runbatch-json-env": "",
                    "runbatch-secret-json-envs": ""
                }
            },
            "project": {"projectId": "acme-batch", "numericProjectId": 123456789}
        });

        let info = InstanceInfo::from_tree(tree).unwrap();
        assert_eq!(info.project_id, "acme-batch");
        assert_eq!(info.zone, "us-central1-a");
        assert_eq!(info.instance_name, "runbatch-0a1b2c3d4e5f");
        assert_eq!(info.attributes.get("runbatch-image").map(String::as_str), Some("busybox"));
    }

    #[test]
    fn test_missing_project_is_error() {
        let tree = json!({"instance": {"name": "x", "zone": "projects/1/zones/a-b1-c"}});
        assert!(InstanceInfo::from_tree(tree).is_err());
    }
}
