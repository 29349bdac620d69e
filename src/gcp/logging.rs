//! Cloud Logging sink for the job log
//!
//! Every agent state change, error, and container output line becomes one
//! entry under `projects/<project>/logs/runbatch`, labelled with the instance
//! name. Entries are written as they happen so progress stays visible after
//! the instance deletes itself.

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use super::ApiClient;
use crate::bootstrap::{JobLog, Severity};

/// Log ID all jobs write to
pub const LOG_ID: &str = "runbatch";

/// Default Cloud Logging v2 endpoint
pub const LOGGING_BASE_URL: &str = "https://logging.googleapis.com/v2";

/// Full log name for a project
pub fn log_name(project_id: &str) -> String {
    format!("projects/{project_id}/logs/{LOG_ID}")
}

/// `gcloud` command line that tails the job log of one instance
pub fn tail_logs_command(project_id: &str, instance_name: &str) -> String {
    format!(
        "CLOUDSDK_PYTHON_SITEPACKAGES=1 gcloud beta --project={project_id} logging tail \
         'logName=\"{log_name}\" AND resource.labels.instance_id=\"{instance_name}\"' \
         --format='get(text_payload)'",
        log_name = log_name(project_id),
    )
}

/// Ships job log lines to Cloud Logging
pub struct CloudLogging {
    api: ApiClient,
    base_url: String,
    project_id: String,
    zone: String,
    instance_name: String,
}

impl CloudLogging {
    pub fn new(
        api: ApiClient,
        project_id: impl Into<String>,
        zone: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            api,
            base_url: LOGGING_BASE_URL.to_string(),
            project_id: project_id.into(),
            zone: zone.into(),
            instance_name: instance_name.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn entry(&self, severity: Severity, message: &str) -> serde_json::Value {
        json!({
            "logName": log_name(&self.project_id),
            "resource": {
                "type": "gce_instance",
                "labels": {
                    "instance_id": self.instance_name,
                    "project_id": self.project_id,
                    "zone": self.zone,
                }
            },
            "entries": [{
                "severity": severity.as_str(),
                "textPayload": message,
            }]
        })
    }
}

#[async_trait]
impl JobLog for CloudLogging {
    async fn log(&self, severity: Severity, message: &str) {
        // Mirror to the serial console too, in case shipping fails.
        match severity {
            Severity::Error => error!(target: "runbatch::job", "{message}"),
            Severity::Warning => warn!(target: "runbatch::job", "{message}"),
            Severity::Info => info!(target: "runbatch::job", "{message}"),
        }

        let url = format!("{}/entries:write", self.base_url);
        if let Err(e) = self.api.post(&url, &self.entry(severity, message)).await {
            warn!(error = %e, "failed to ship job log entry");
        }
    }
}
