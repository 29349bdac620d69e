//! `runbatch` command line: launch one job and print how to tail its logs

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use runbatch::config::LauncherArgs;
use runbatch::gcp::logging::tail_logs_command;
use runbatch::job::DEFAULT_MACHINE_PREFIX;
use runbatch::tracing::{init_tracing, shutdown_tracing, TelemetryArgs};
use runbatch::JobRequest;

/// Run a container image as a batch job on a short-lived Compute Engine VM
#[derive(Debug, Parser)]
#[command(name = "runbatch", version)]
struct Cli {
    /// GCP project where the VM instance will be created
    #[arg(long)]
    project_id: String,

    /// GCP zone where the VM instance will be created, e.g. us-central1-a
    #[arg(long)]
    zone: String,

    /// Service account email the job runs as
    #[arg(long)]
    service_account: String,

    /// Prefix for the VM instance name
    #[arg(long, default_value = DEFAULT_MACHINE_PREFIX)]
    machine_prefix: String,

    /// JSON object of plaintext environment variables, e.g. '{"FOO":"foo"}'
    #[arg(long, default_value = "")]
    json_env: String,

    /// Secret Manager reference whose payload is a JSON env object
    /// (repeatable), e.g. projects/12345/secrets/name/versions/latest
    #[arg(long = "secret-json-env")]
    secret_json_envs: Vec<String>,

    /// Fully qualified container image to run
    image: String,

    #[command(flatten)]
    launcher: LauncherArgs,

    #[command(flatten)]
    telemetry: TelemetryArgs,
}

impl Cli {
    fn job_request(&self) -> JobRequest {
        JobRequest {
            project_id: self.project_id.clone(),
            zone: self.zone.clone(),
            service_account: self.service_account.clone(),
            machine_prefix: self.machine_prefix.clone(),
            image: self.image.clone(),
            json_env: self.json_env.clone(),
            secret_json_envs: self.secret_json_envs.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing("runbatch", &cli.telemetry) {
        eprintln!("failed to initialize tracing: {e}");
        return ExitCode::FAILURE;
    }

    let code = run(&cli).await;
    shutdown_tracing();
    code
}

async fn run(cli: &Cli) -> ExitCode {
    let launcher = match cli.launcher.launcher() {
        Ok(launcher) => launcher,
        Err(e) => {
            error!(error = %e, "failed to load bootstrap script");
            return ExitCode::FAILURE;
        }
    };

    match launcher.launch(&cli.job_request()).await {
        Ok(handle) => {
            println!(
                "Successfully started instance {}. To tail batch logs run:",
                handle.instance_name
            );
            println!("{}", tail_logs_command(&cli.project_id, &handle.instance_name));
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, kind = e.kind(), "launch failed");
            ExitCode::FAILURE
        }
    }
}
