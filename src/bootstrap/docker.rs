//! Docker-backed workload runner
//!
//! Values never appear on the docker command line: each variable is passed as
//! `--env NAME` and the value is set in the docker client's own environment,
//! so it does not show up in `ps` output on the host.
//!
//! Output is read as raw lines and decoded lossily. Both pipes are read until
//! EOF; if reading fails the docker client is killed so it cannot block on a
//! full pipe.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{JobLog, ResolvedEnvironment, Severity, WorkloadRunner};
use crate::error::WorkloadError;

/// Registry host configured for credential-helper auth by default
pub const DEFAULT_CREDENTIAL_REGISTRY: &str = "us-central1-docker.pkg.dev";

/// Name given to the job container; one job runs per instance
pub const JOB_CONTAINER_NAME: &str = "runbatch-job";

/// Runs the workload with the local `docker` CLI
#[derive(Debug, Clone)]
pub struct DockerRunner {
    docker_bin: String,
    credential_registries: Vec<String>,
    container_name: String,
}

impl Default for DockerRunner {
    fn default() -> Self {
        Self::new("docker", vec![DEFAULT_CREDENTIAL_REGISTRY.to_string()])
    }
}

impl DockerRunner {
    pub fn new(docker_bin: impl Into<String>, credential_registries: Vec<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            credential_registries,
            container_name: JOB_CONTAINER_NAME.to_string(),
        }
    }

    /// Arguments for `docker run`, in order. Contains names only.
    pub fn run_args(&self, image: &str, env: &ResolvedEnvironment) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.container_name.clone(),
        ];
        for (name, _) in env.iter() {
            args.push("--env".to_string());
            args.push(name.clone());
        }
        args.push(image.to_string());
        args
    }

    /// Forward both output streams to `log` until they close
    async fn forward_output(&self, child: &mut Child, log: &dyn JobLog) {
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return;
        };
        let (mut stdout, mut stderr) = (BufReader::new(stdout), BufReader::new(stderr));
        let (mut stdout_buf, mut stderr_buf) = (Vec::new(), Vec::new());
        let (mut stdout_open, mut stderr_open) = (true, true);

        while stdout_open || stderr_open {
            tokio::select! {
                line = read_line(&mut stdout, &mut stdout_buf), if stdout_open => {
                    stdout_open = self.handle_line(line, Severity::Info, child, log).await;
                }
                line = read_line(&mut stderr, &mut stderr_buf), if stderr_open => {
                    stderr_open = self.handle_line(line, Severity::Error, child, log).await;
                }
            }
        }
    }

    /// Log one read result; returns whether the stream is still open
    async fn handle_line(
        &self,
        line: io::Result<Option<String>>,
        severity: Severity,
        child: &mut Child,
        log: &dyn JobLog,
    ) -> bool {
        match line {
            Ok(Some(line)) => {
                log.log(severity, &line).await;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "failed to read container output, killing docker client");
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "failed to kill docker client");
                }
                false
            }
        }
    }
}

/// Read one `\n`-terminated line, lossily decoded; `None` at EOF.
///
/// Partial reads stay in `buf`, so a cancelled call can be resumed.
async fn read_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
) -> io::Result<Option<String>> {
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    let line = String::from_utf8_lossy(&buf[..end]).into_owned();
    buf.clear();
    Ok(Some(line))
}

#[async_trait]
impl WorkloadRunner for DockerRunner {
    async fn prepare(&self) -> Result<(), WorkloadError> {
        if self.credential_registries.is_empty() {
            return Ok(());
        }

        let registries = self.credential_registries.join(",");
        debug!(%registries, "configuring docker credential helper");
        let status = Command::new("docker-credential-gcr")
            .args(["configure-docker", "--registries", &registries])
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| WorkloadError::Prepare(format!("docker-credential-gcr: {e}")))?;

        if !status.success() {
            return Err(WorkloadError::Prepare(format!(
                "docker-credential-gcr exited with {status}"
            )));
        }
        Ok(())
    }

    async fn run(
        &self,
        image: &str,
        env: &ResolvedEnvironment,
        log: &dyn JobLog,
    ) -> Result<i32, WorkloadError> {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(self.run_args(image, env))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (name, value) in env.iter() {
            cmd.env(name, value);
        }

        info!(image, variables = env.len(), "starting container");
        let mut child = cmd.spawn().map_err(WorkloadError::Spawn)?;

        self.forward_output(&mut child, log).await;

        let status = child.wait().await.map_err(WorkloadError::Spawn)?;
        status.code().ok_or(WorkloadError::Killed)
    }

    /// Remove the job container; the docker client alone does not stop it
    async fn abort(&self) {
        let result = Command::new(&self.docker_bin)
            .args(["rm", "--force", &self.container_name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match result {
            Ok(status) if status.success() => {
                info!(container = %self.container_name, "job container removed")
            }
            Ok(status) => warn!(container = %self.container_name, %status, "docker rm failed"),
            Err(e) => warn!(container = %self.container_name, error = %e, "docker rm failed"),
        }
    }
}
