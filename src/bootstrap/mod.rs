//! VM-side bootstrap agent
//!
//! The agent is the only code that runs on the launched instance. Its sole
//! input is the configuration channel (instance metadata); its only output is
//! the job log. It never talks back to the launcher.
//!
//! # Lifecycle
//!
//! ```text
//! Booting ──► ResolvingSecrets ──► AssemblingEnvironment ──► RunningWorkload
//!    │               │                      │                      │
//!    └───────────────┴──────── error ───────┴──────────────────────┤
//!                                                                  ▼
//!                                                             Terminating
//!                                                        (instance deletes itself)
//! ```
//!
//! Collaborators sit behind traits so every failure point can be exercised
//! without a cloud: [`SecretStore`], [`WorkloadRunner`], [`InstanceReaper`],
//! and [`JobLog`].

pub mod agent;
pub mod docker;
pub mod environment;

use async_trait::async_trait;

use crate::error::WorkloadError;

pub use agent::{BootstrapAgent, BootstrapReport, BootstrapState};
pub use docker::DockerRunner;
pub use environment::{resolve_environment, ResolvedEnvironment};

/// Error type returned by collaborator implementations
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Severity of a job log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Cloud Logging severity name
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// Resolves a secret reference to its payload text
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn access(&self, reference: &str) -> Result<String, BoxError>;
}

/// The job's log stream. Writes are best-effort and never fail the job.
#[async_trait]
pub trait JobLog: Send + Sync {
    async fn log(&self, severity: Severity, message: &str);
}

/// Runs the container workload
#[async_trait]
pub trait WorkloadRunner: Send + Sync {
    /// One-time setup before any image is pulled (registry credentials etc.)
    async fn prepare(&self) -> Result<(), WorkloadError> {
        Ok(())
    }

    /// Run `image` to completion and return its exit code
    async fn run(
        &self,
        image: &str,
        env: &ResolvedEnvironment,
        log: &dyn JobLog,
    ) -> Result<i32, WorkloadError>;

    /// Stop a workload whose `run` future was abandoned
    async fn abort(&self) {}
}

/// Deletes the instance the agent runs on
#[async_trait]
pub trait InstanceReaper: Send + Sync {
    async fn delete_self(&self) -> Result<(), BoxError>;
}
