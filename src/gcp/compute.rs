//! Compute Engine instances API
//!
//! The launcher creates instances through [`ComputeClient`]; the agent deletes
//! its own instance through [`ComputeReaper`].

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::ApiClient;
use crate::bootstrap::{BoxError, InstanceReaper};
use crate::error::{ApiError, ProvisioningError};
use crate::job::Zone;
use crate::launch::Provisioner;
use crate::vm::config::InstanceSpec;

/// Default Compute Engine v1 endpoint
pub const COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// Client for `instances.insert` / `instances.delete`
#[derive(Clone)]
pub struct ComputeClient {
    api: ApiClient,
    base_url: String,
}

impl ComputeClient {
    pub fn new(api: ApiClient) -> Self {
        Self::with_base_url(api, COMPUTE_BASE_URL)
    }

    pub fn with_base_url(api: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            api,
            base_url: base_url.into(),
        }
    }

    fn instances_url(&self, project_id: &str, zone: &str) -> String {
        format!("{}/projects/{}/zones/{}/instances", self.base_url, project_id, zone)
    }

    /// Submit an insert; returns the zone operation
    pub async fn insert_instance(
        &self,
        project_id: &str,
        zone: &str,
        spec: &InstanceSpec,
    ) -> Result<Value, ApiError> {
        let url = self.instances_url(project_id, zone);
        debug!(instance = %spec.name, %url, "inserting instance");
        self.api.post(&url, spec).await
    }

    /// Submit a delete; returns the zone operation
    pub async fn delete_instance(
        &self,
        project_id: &str,
        zone: &str,
        instance_name: &str,
    ) -> Result<Value, ApiError> {
        let url = format!("{}/{}", self.instances_url(project_id, zone), instance_name);
        debug!(instance = instance_name, %url, "deleting instance");
        self.api.delete(&url).await
    }
}

#[async_trait]
impl Provisioner for ComputeClient {
    async fn create_instance(
        &self,
        project_id: &str,
        zone: &Zone,
        spec: &InstanceSpec,
    ) -> Result<(), ProvisioningError> {
        let operation = self
            .insert_instance(project_id, &zone.to_string(), spec)
            .await?;
        if let Some(error) = operation.get("error") {
            return Err(ProvisioningError::Rejected(error.to_string()));
        }
        info!(
            instance = %spec.name,
            operation = operation_name(&operation),
            "instance insert accepted"
        );
        Ok(())
    }
}

/// Name of a zone operation, or "" if the response has none
fn operation_name(operation: &Value) -> &str {
    operation
        .get("name")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
}

/// Deletes the instance the agent is running on
pub struct ComputeReaper {
    compute: ComputeClient,
    project_id: String,
    zone: String,
    instance_name: String,
}

impl ComputeReaper {
    pub fn new(
        compute: ComputeClient,
        project_id: impl Into<String>,
        zone: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            compute,
            project_id: project_id.into(),
            zone: zone.into(),
            instance_name: instance_name.into(),
        }
    }
}

#[async_trait]
impl InstanceReaper for ComputeReaper {
    async fn delete_self(&self) -> Result<(), BoxError> {
        self.compute
            .delete_instance(&self.project_id, &self.zone, &self.instance_name)
            .await?;
        Ok(())
    }
}
