//! Bootstrap agent state machine
//!
//! `BootstrapAgent::run` walks the states in order, never re-entering one.
//! Whatever happens before `Terminating` (bad channel, unreadable secret,
//! container failure, timeout) is written to the job log, and then the
//! instance is deleted. Deletion is attempted exactly once per run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::environment::resolve_environment;
use super::{InstanceReaper, JobLog, SecretStore, Severity, WorkloadRunner};
use crate::env::{is_valid_env_name, parse_env_json, EnvMap};
use crate::error::{BootstrapError, WorkloadError};
use crate::metadata::ChannelPayload;

/// Agent lifecycle states, in the only order they can be visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootstrapState {
    /// Reading the configuration channel and preparing the container runtime
    Booting,
    /// Fetching and parsing every secret reference
    ResolvingSecrets,
    /// Merging secret and plaintext env
    AssemblingEnvironment,
    /// Container is running
    RunningWorkload,
    /// Deleting the instance
    Terminating,
}

/// What happened during one agent run
#[derive(Debug)]
pub struct BootstrapReport {
    /// States entered, in order
    pub visited: Vec<BootstrapState>,
    /// Container exit code, if it ran to completion
    pub exit_code: Option<i32>,
    /// The error that ended the job early, or a non-zero exit
    pub failure: Option<BootstrapError>,
    /// Result of the self-deletion request
    pub termination: Result<(), BootstrapError>,
}

impl BootstrapReport {
    /// Whether the instance deletion request was accepted
    pub fn self_deleted(&self) -> bool {
        self.termination.is_ok()
    }
}

/// Forward-only record of visited states
struct Progress {
    visited: Vec<BootstrapState>,
}

impl Progress {
    fn new() -> Self {
        Self {
            visited: Vec::new(),
        }
    }

    fn enter(&mut self, next: BootstrapState) {
        debug_assert!(
            self.visited.last().map_or(true, |current| *current < next),
            "bootstrap state {next:?} entered out of order"
        );
        self.visited.push(next);
    }
}

/// Runs one job on the current instance and then deletes it
pub struct BootstrapAgent {
    secrets: Arc<dyn SecretStore>,
    runner: Arc<dyn WorkloadRunner>,
    reaper: Arc<dyn InstanceReaper>,
    log: Arc<dyn JobLog>,
    run_timeout: Option<Duration>,
}

impl BootstrapAgent {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        runner: Arc<dyn WorkloadRunner>,
        reaper: Arc<dyn InstanceReaper>,
        log: Arc<dyn JobLog>,
    ) -> Self {
        Self {
            secrets,
            runner,
            reaper,
            log,
            run_timeout: None,
        }
    }

    /// Stop waiting for the container after `timeout` and terminate anyway
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Run the whole lifecycle against the instance attributes
    pub async fn run(&self, attributes: &HashMap<String, String>) -> BootstrapReport {
        let mut progress = Progress::new();

        let (exit_code, failure) = match self.execute(&mut progress, attributes).await {
            Ok(0) => (Some(0), None),
            Ok(code) => (Some(code), Some(WorkloadError::NonZeroExit(code).into())),
            Err(e) => (None, Some(e)),
        };

        if let Some(e) = &failure {
            error!(error = %e, "job failed");
            self.log.log(Severity::Error, &format!("runbatch: {e}")).await;
        }

        progress.enter(BootstrapState::Terminating);
        self.log
            .log(Severity::Info, "runbatch: deleting instance")
            .await;
        let termination = self
            .reaper
            .delete_self()
            .await
            .map_err(|e| BootstrapError::Termination(e.to_string()));
        if let Err(e) = &termination {
            error!(error = %e, "self-deletion failed");
            self.log.log(Severity::Error, &format!("runbatch: {e}")).await;
        }

        BootstrapReport {
            visited: progress.visited,
            exit_code,
            failure,
            termination,
        }
    }

    async fn execute(
        &self,
        progress: &mut Progress,
        attributes: &HashMap<String, String>,
    ) -> Result<i32, BootstrapError> {
        self.enter(progress, BootstrapState::Booting).await;
        let payload = ChannelPayload::from_attributes(attributes)?;
        self.runner.prepare().await?;

        self.enter(progress, BootstrapState::ResolvingSecrets).await;
        let mut secret_envs = Vec::new();
        for reference in payload.secret_refs() {
            secret_envs.push(self.resolve_secret(reference).await?);
        }

        self.enter(progress, BootstrapState::AssemblingEnvironment).await;
        let plaintext = payload.plaintext_env()?;
        if let Some(name) = plaintext.keys().find(|name| !is_valid_env_name(name)) {
            return Err(BootstrapError::PlaintextEnv(format!(
                "{name:?} is not a valid environment variable name"
            )));
        }
        let env = resolve_environment(secret_envs, plaintext);
        info!(variables = ?env, "environment assembled");

        self.enter(progress, BootstrapState::RunningWorkload).await;
        self.log
            .log(Severity::Info, &format!("runbatch: running {}", payload.image))
            .await;
        let run = self.runner.run(&payload.image, &env, self.log.as_ref());
        let code = match self.run_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(?limit, "workload timed out, stopping container");
                    self.runner.abort().await;
                    return Err(WorkloadError::TimedOut(limit).into());
                }
            },
            None => run.await?,
        };

        let severity = if code == 0 {
            Severity::Info
        } else {
            Severity::Error
        };
        self.log
            .log(severity, &format!("exited with code: {code}"))
            .await;
        Ok(code)
    }

    async fn enter(&self, progress: &mut Progress, state: BootstrapState) {
        progress.enter(state);
        info!(?state, "bootstrap state");
    }

    /// Fetch one secret and parse it; any failure is fatal for the job
    async fn resolve_secret(&self, reference: &str) -> Result<EnvMap, BootstrapError> {
        let fail = |reason: String| BootstrapError::SecretResolution {
            reference: reference.to_string(),
            reason,
        };

        let text = self
            .secrets
            .access(reference)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let env = parse_env_json(&text)
            .map_err(|e| fail(format!("payload is not a JSON env object: {e}")))?;
        if let Some(name) = env.keys().find(|name| !is_valid_env_name(name)) {
            return Err(fail(format!("{name:?} is not a valid environment variable name")));
        }
        if env.is_empty() {
            warn!(reference, "secret resolved to an empty environment");
        }
        Ok(env)
    }
}
