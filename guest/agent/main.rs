//! Bootstrap agent - runs on the launched instance
//!
//! Started by the instance startup script. Reads the job from instance
//! metadata, runs it with docker, ships its output to Cloud Logging, and
//! deletes the instance. Exits non-zero only when self-deletion failed, so the
//! startup script knows to delete the instance itself.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use runbatch::bootstrap::docker::DEFAULT_CREDENTIAL_REGISTRY;
use runbatch::bootstrap::{BootstrapAgent, DockerRunner};
use runbatch::gcp::{
    ApiClient, CloudLogging, ComputeClient, ComputeReaper, MetadataClient, MetadataTokenSource,
    SecretManager,
};
use runbatch::tracing::{init_tracing, shutdown_tracing, TelemetryArgs};

/// Run the job described by this instance's metadata, then delete the instance
#[derive(Debug, Parser)]
#[command(name = "runbatch-agent", version)]
struct Args {
    /// Kill the container if it is still running after this many seconds
    #[arg(long, env = "RUNBATCH_RUN_TIMEOUT_SECS")]
    run_timeout_secs: Option<u64>,

    /// Registries to configure the docker credential helper for
    #[arg(
        long = "credential-registry",
        env = "RUNBATCH_CREDENTIAL_REGISTRIES",
        value_delimiter = ',',
        default_value = DEFAULT_CREDENTIAL_REGISTRY
    )]
    credential_registries: Vec<String>,

    /// Docker CLI to run the workload with
    #[arg(long, env = "RUNBATCH_DOCKER_BIN", default_value = "docker")]
    docker_bin: String,

    #[command(flatten)]
    telemetry: TelemetryArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing("runbatch-agent", &args.telemetry) {
        eprintln!("failed to initialize tracing: {e}");
        return ExitCode::FAILURE;
    }

    let code = run(args).await;
    shutdown_tracing();
    code
}

async fn run(args: Args) -> ExitCode {
    let metadata = MetadataClient::from_env();
    let instance = match metadata.instance_info().await {
        Ok(instance) => instance,
        Err(e) => {
            // Without the instance identity there is nothing to delete.
            error!(error = %e, "failed to read instance metadata");
            return ExitCode::FAILURE;
        }
    };
    info!(
        instance = %instance.instance_name,
        zone = %instance.zone,
        project = %instance.project_id,
        "bootstrap agent starting"
    );

    let api = ApiClient::new(Arc::new(MetadataTokenSource::new(metadata)));
    let log = Arc::new(CloudLogging::new(
        api.clone(),
        instance.project_id.clone(),
        instance.zone.clone(),
        instance.instance_name.clone(),
    ));
    let reaper = Arc::new(ComputeReaper::new(
        ComputeClient::new(api.clone()),
        instance.project_id.clone(),
        instance.zone.clone(),
        instance.instance_name.clone(),
    ));
    let runner = Arc::new(DockerRunner::new(args.docker_bin, args.credential_registries));

    let mut agent = BootstrapAgent::new(Arc::new(SecretManager::new(api)), runner, reaper, log);
    if let Some(secs) = args.run_timeout_secs {
        agent = agent.with_run_timeout(Duration::from_secs(secs));
    }

    let report = agent.run(&instance.attributes).await;
    info!(
        states = ?report.visited,
        exit_code = ?report.exit_code,
        failed = report.failure.is_some(),
        "bootstrap finished"
    );

    if report.self_deleted() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
