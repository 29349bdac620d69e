//! `runbatch-function`: HTTP launch handler for Cloud Run / Cloud Functions

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use runbatch::config::LauncherArgs;
use runbatch::handler::create_router;
use runbatch::tracing::{init_tracing, shutdown_tracing, TelemetryArgs};

/// Serve job launches over HTTP
#[derive(Debug, Parser)]
#[command(name = "runbatch-function", version)]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    #[command(flatten)]
    launcher: LauncherArgs,

    #[command(flatten)]
    telemetry: TelemetryArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing("runbatch-function", &args.telemetry) {
        eprintln!("failed to initialize tracing: {e}");
        return ExitCode::FAILURE;
    }

    let code = match serve(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "handler stopped");
            ExitCode::FAILURE
        }
    };
    shutdown_tracing();
    code
}

async fn serve(args: &Args) -> std::io::Result<()> {
    let launcher = Arc::new(args.launcher.launcher()?);
    let app = create_router(launcher);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "launch handler listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
