//! Job request validation
//!
//! `JobRequest` is what callers send (CLI flags or the handler's JSON body).
//! `JobDescriptor` is the validated, normalized form the rest of the launch
//! path consumes. Once built it cannot be changed.

use serde::{Deserialize, Serialize};

use super::Zone;
use crate::env::{is_valid_env_name, parse_env_json};
use crate::error::{RequiredField, ValidationError};

/// Prefix used for instance names when the caller does not pick one
pub const DEFAULT_MACHINE_PREFIX: &str = "runbatch";

/// Longest prefix that still leaves room for the hyphen and random suffix
/// inside the 63-character instance name limit
pub const MAX_MACHINE_PREFIX_LEN: usize = 50;

/// Raw job request as supplied by a caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobRequest {
    /// GCP project where the VM instance will be created
    pub project_id: String,
    /// GCP zone where the VM instance will be created
    pub zone: String,
    /// Service account email the workload runs as
    pub service_account: String,
    /// Prefix for the VM instance name
    pub machine_prefix: String,
    /// Fully qualified container image to run
    pub image: String,
    /// JSON object of plaintext environment variables, e.g. `{"FOO":"foo"}`
    pub json_env: String,
    /// Secret Manager references whose payloads are JSON env objects, e.g.
    /// `projects/12345/secrets/name/versions/latest`
    pub secret_json_envs: Vec<String>,
}

impl JobRequest {
    /// Validate and normalize into a [`JobDescriptor`]
    pub fn validate(&self) -> Result<JobDescriptor, ValidationError> {
        JobDescriptor::try_from(self.clone())
    }
}

/// A validated job, ready to be turned into an instance spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    project_id: String,
    zone: Zone,
    service_account: String,
    machine_prefix: String,
    image: String,
    env_json: String,
    secret_refs: Vec<String>,
}

impl JobDescriptor {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn service_account(&self) -> &str {
        &self.service_account
    }

    pub fn machine_prefix(&self) -> &str {
        &self.machine_prefix
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Raw plaintext env JSON; empty when the job has none
    pub fn env_json(&self) -> &str {
        &self.env_json
    }

    pub fn secret_refs(&self) -> &[String] {
        &self.secret_refs
    }
}

impl TryFrom<JobRequest> for JobDescriptor {
    type Error = ValidationError;

    fn try_from(request: JobRequest) -> Result<Self, Self::Error> {
        // Fixed order: the first missing field is the one reported.
        require(&request.project_id, RequiredField::ProjectId)?;
        require(&request.zone, RequiredField::Zone)?;
        require(&request.service_account, RequiredField::ServiceAccount)?;
        require(&request.image, RequiredField::Image)?;

        let zone: Zone = request.zone.parse()?;

        let machine_prefix = if request.machine_prefix.is_empty() {
            DEFAULT_MACHINE_PREFIX.to_string()
        } else {
            check_machine_prefix(&request.machine_prefix)?;
            request.machine_prefix
        };

        check_env_json(&request.json_env)?;

        for reference in &request.secret_json_envs {
            check_secret_ref(reference)?;
        }

        Ok(JobDescriptor {
            project_id: request.project_id,
            zone,
            service_account: request.service_account,
            machine_prefix,
            image: request.image,
            env_json: request.json_env,
            secret_refs: request.secret_json_envs,
        })
    }
}

fn require(value: &str, field: RequiredField) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn check_machine_prefix(prefix: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidMachinePrefix {
        prefix: prefix.to_string(),
        reason,
    };

    if prefix.len() > MAX_MACHINE_PREFIX_LEN {
        return Err(invalid("must be at most 50 characters"));
    }
    if !prefix.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(invalid("must start with a lower-case letter"));
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid("may only contain lower-case letters, digits and hyphens"));
    }
    Ok(())
}

fn check_env_json(json_env: &str) -> Result<(), ValidationError> {
    let env = parse_env_json(json_env)
        .map_err(|e| ValidationError::InvalidEnvJson(e.to_string()))?;
    if let Some(name) = env.keys().find(|name| !is_valid_env_name(name)) {
        return Err(ValidationError::InvalidEnvJson(format!(
            "{name:?} is not a valid environment variable name"
        )));
    }
    Ok(())
}

fn check_secret_ref(reference: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidSecretRef {
        reference: reference.to_string(),
        reason,
    };

    if reference.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if reference.contains(',') {
        return Err(invalid("must not contain a comma"));
    }
    Ok(())
}
