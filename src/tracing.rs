//! Logging and OpenTelemetry tracing
//!
//! Every binary calls [`init_tracing`] once at startup:
//! - Console output (plain or JSON) filtered by `RUST_LOG`
//! - Optional span export to an OTLP collector
//!
//! ```text
//! runbatch ──► stdout / Cloud Run logs
//!          └─► OTLP (gRPC) ──► OTel Collector ──► Tempo / Cloud Trace
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,runbatch=debug";

/// Console output format and optional OTLP export
#[derive(Debug, Clone, Default, clap::Args)]
pub struct TelemetryArgs {
    /// OTLP collector endpoint; spans are only exported when set
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "RUNBATCH_LOG_JSON")]
    pub log_json: bool,
}

/// Initialize the tracing subsystem
///
/// # Arguments
/// * `service_name` - Name for the service in exported traces
/// * `telemetry` - Output format and OTLP endpoint
///
/// # Example
/// ```ignore
/// init_tracing("runbatch", &TelemetryArgs::default())?;
/// ```
pub fn init_tracing(
    service_name: &str,
    telemetry: &TelemetryArgs,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let otel_layer = match telemetry.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(
                    vec![
                        KeyValue::new("service.name", service_name.to_string()),
                        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ],
                )))
                .install_batch(runtime::Tokio)?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let (json_layer, plain_layer) = if telemetry.log_json {
        (
            Some(tracing_subscriber::fmt::layer().json().with_target(true)),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(otel_layer)
        .try_init()?;

    ::tracing::debug!(
        service = service_name,
        otlp = telemetry.otlp_endpoint.as_deref().unwrap_or("disabled"),
        "tracing initialized"
    );

    Ok(())
}

/// Flush pending spans to the collector
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_enables_crate_debug() {
        assert_eq!(DEFAULT_FILTER, "info,runbatch=debug");
        assert!(TelemetryArgs::default().otlp_endpoint.is_none());
    }
}
