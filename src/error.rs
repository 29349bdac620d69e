//! Error types for the launch (control-plane) and bootstrap (VM-side) paths
//!
//! Control-plane errors are returned verbatim to the caller. Bootstrap errors
//! never leave the VM; the agent writes them to the job log and then deletes
//! the instance anyway.

use std::fmt;

use thiserror::Error;

/// Required job fields, in the order validation checks them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    ProjectId,
    Zone,
    ServiceAccount,
    Image,
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequiredField::ProjectId => "project ID",
            RequiredField::Zone => "zone",
            RequiredField::ServiceAccount => "service account",
            RequiredField::Image => "image",
        };
        f.write_str(name)
    }
}

/// A job request that cannot be launched as given
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(RequiredField),

    #[error("malformed zone {zone:?}: expected <region>-<letter>, e.g. us-central1-a")]
    MalformedZone { zone: String },

    #[error("invalid machine prefix {prefix:?}: {reason}")]
    InvalidMachinePrefix { prefix: String, reason: &'static str },

    #[error("invalid JSON env: {0}")]
    InvalidEnvJson(String),

    #[error("invalid secret reference {reference:?}: {reason}")]
    InvalidSecretRef {
        reference: String,
        reason: &'static str,
    },
}

/// Failure calling a Google Cloud REST endpoint
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to obtain access token: {0}")]
    Auth(String),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// The instance creation call failed or was refused
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("instance creation failed: {0}")]
    Api(#[from] ApiError),

    #[error("instance creation rejected: {0}")]
    Rejected(String),
}

/// Anything that stops `Launcher::launch` from returning a handle
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to generate instance name suffix: {0}")]
    Randomness(#[source] rand::Error),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}

impl LaunchError {
    /// Short label used for the `outcome` metric dimension
    pub fn kind(&self) -> &'static str {
        match self {
            LaunchError::Validation(_) => "validation_error",
            LaunchError::Randomness(_) => "randomness_error",
            LaunchError::Provisioning(_) => "provisioning_error",
        }
    }
}

/// Failure of the container workload itself
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("failed to prepare container runtime: {0}")]
    Prepare(String),

    #[error("failed to start container: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("container exited with code {0}")]
    NonZeroExit(i32),

    #[error("container was terminated by a signal")]
    Killed,

    #[error("container did not finish within {0:?}")]
    TimedOut(std::time::Duration),
}

/// Errors raised inside the VM by the bootstrap agent
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("metadata server: {0}")]
    Metadata(String),

    #[error("configuration channel is missing key {0:?}")]
    MissingKey(&'static str),

    #[error("failed to resolve secret {reference}: {reason}")]
    SecretResolution { reference: String, reason: String },

    #[error("invalid plaintext env: {0}")]
    PlaintextEnv(String),

    #[error(transparent)]
    Workload(#[from] WorkloadError),

    #[error("self-deletion failed: {0}")]
    Termination(String),
}
