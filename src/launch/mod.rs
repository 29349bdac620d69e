//! Launch orchestrator
//!
//! ```text
//! JobRequest ──validate──► JobDescriptor ──build──► InstanceSpec ──submit──► LaunchHandle
//! ```
//!
//! Each step either succeeds or aborts the launch with its error unchanged.
//! Nothing is retried and nothing is remembered between launches; the shared
//! `Launcher` is immutable, so concurrent launches need no coordination.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::error::{LaunchError, ProvisioningError};
use crate::job::{JobDescriptor, JobRequest, Zone};
use crate::metrics::{LAUNCHES_TOTAL, LAUNCH_DURATION};
use crate::vm::{InstanceSpec, InstanceSpecBuilder};

/// Creates instances from fully built specs
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Submit `spec` for creation in `project_id`/`zone`.
    ///
    /// Returns once the request has been accepted; the instance may still be
    /// booting.
    async fn create_instance(
        &self,
        project_id: &str,
        zone: &Zone,
        spec: &InstanceSpec,
    ) -> Result<(), ProvisioningError>;
}

/// Result of a successful launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchHandle {
    pub instance_name: String,
}

/// Validates jobs, builds their instance specs and submits them
pub struct Launcher {
    builder: InstanceSpecBuilder,
    provisioner: Arc<dyn Provisioner>,
}

impl Launcher {
    pub fn new(builder: InstanceSpecBuilder, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            builder,
            provisioner,
        }
    }

    /// Launch a raw job request
    pub async fn launch(&self, request: &JobRequest) -> Result<LaunchHandle, LaunchError> {
        let trace_id = Uuid::now_v7();
        let span = tracing::info_span!("launch", %trace_id, image = %request.image);

        async {
            let start = Instant::now();
            let result = match request.validate() {
                Ok(descriptor) => self.submit(&descriptor).await,
                Err(e) => Err(e.into()),
            };
            LAUNCH_DURATION.observe(start.elapsed().as_secs_f64());

            match &result {
                Ok(handle) => {
                    LAUNCHES_TOTAL.with_label_values(&["launched"]).inc();
                    info!(instance = %handle.instance_name, "job launched");
                }
                Err(e) => {
                    LAUNCHES_TOTAL.with_label_values(&[e.kind()]).inc();
                    warn!(error = %e, "launch failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn submit(&self, descriptor: &JobDescriptor) -> Result<LaunchHandle, LaunchError> {
        let spec = self.builder.build(descriptor)?;
        info!(
            instance = %spec.name,
            project = descriptor.project_id(),
            zone = %descriptor.zone(),
            secrets = descriptor.secret_refs().len(),
            "creating instance"
        );
        self.provisioner
            .create_instance(descriptor.project_id(), descriptor.zone(), &spec)
            .await?;
        Ok(LaunchHandle {
            instance_name: spec.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::{RequiredField, ValidationError};
    use crate::metadata::BootstrapScript;
    use crate::vm::LaunchPolicy;

    /// Records submitted specs and optionally rejects them
    #[derive(Default)]
    struct FakeProvisioner {
        submitted: Mutex<Vec<(String, String, InstanceSpec)>>,
        reject: bool,
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        async fn create_instance(
            &self,
            project_id: &str,
            zone: &Zone,
            spec: &InstanceSpec,
        ) -> Result<(), ProvisioningError> {
            self.submitted.lock().unwrap().push((
                project_id.to_string(),
                zone.to_string(),
                spec.clone(),
            ));
            if self.reject {
                return Err(ProvisioningError::Rejected("QUOTA_EXCEEDED".to_string()));
            }
            Ok(())
        }
    }

    fn builder() -> InstanceSpecBuilder {
        InstanceSpecBuilder::new(
            LaunchPolicy::default(),
            BootstrapScript::for_agent_image("gcr.io/acme/runbatch-agent:1"),
        )
    }

    fn request() -> JobRequest {
        JobRequest {
            project_id: "acme".to_string(),
            zone: "europe-west4-b".to_string(),
            service_account: "jobs@acme.iam.gserviceaccount.com".to_string(),
            image: "busybox".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_handle_names_submitted_instance() {
        let provisioner = Arc::new(FakeProvisioner::default());
        let launcher = Launcher::new(builder(), provisioner.clone());

        let handle = launcher.launch(&request()).await.unwrap();

        let submitted = provisioner.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        let (project, zone, spec) = &submitted[0];
        assert_eq!(project, "acme");
        assert_eq!(zone, "europe-west4-b");
        assert_eq!(spec.name, handle.instance_name);
        assert!(handle.instance_name.starts_with("runbatch-"));
    }

    #[tokio::test]
    async fn test_validation_error_submits_nothing() {
        let provisioner = Arc::new(FakeProvisioner::default());
        let launcher = Launcher::new(builder(), provisioner.clone());

        let bad = JobRequest {
            service_account: String::new(),
            ..request()
        };
        let err = launcher.launch(&bad).await.unwrap_err();

        assert!(matches!(
            err,
            LaunchError::Validation(ValidationError::MissingField(
                RequiredField::ServiceAccount
            ))
        ));
        assert!(provisioner.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provisioning_error_propagates() {
        let provisioner = Arc::new(FakeProvisioner {
            reject: true,
            ..Default::default()
        });
        let launcher = Launcher::new(builder(), provisioner);

        let err = launcher.launch(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            LaunchError::Provisioning(ProvisioningError::Rejected(_))
        ));
        assert!(err.to_string().contains("QUOTA_EXCEEDED"));
    }

    #[test]
    fn test_handle_wire_format() {
        let handle = LaunchHandle {
            instance_name: "runbatch-0a1b2c3d4e5f".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&handle).unwrap(),
            r#"{"instanceName":"runbatch-0a1b2c3d4e5f"}"#
        );
    }
}
