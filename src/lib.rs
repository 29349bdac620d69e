//! runbatch - run one container job on a throwaway Compute Engine VM
//!
//! The control plane validates a job, builds an instance spec whose metadata
//! carries the job configuration, and submits it. On the VM, the bootstrap
//! agent reads that metadata, resolves secrets, runs the container, and then
//! deletes its own instance.
//!
//! # Modules
//!
//! - `job` - job requests, validation, and zone parsing
//! - `vm` - instance spec types and the spec builder
//! - `metadata` - the metadata configuration channel and startup script
//! - `launch` - the launch orchestrator and the `Provisioner` seam
//! - `handler` - stateless HTTP front end for launches
//! - `bootstrap` - VM-side agent state machine and its collaborators
//! - `gcp` - Google Cloud REST clients (Compute, Secret Manager, Logging, metadata server)
//! - `config` - launcher settings from flags and environment
//! - `metrics` - Prometheus metrics
//! - `tracing` - logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use runbatch::{config::LauncherArgs, JobRequest};
//!
//! let launcher = LauncherArgs {
//!     agent_image: Some("us-central1-docker.pkg.dev/my-project/ops/runbatch-agent:1".into()),
//!     ..Default::default()
//! }
//! .launcher()?;
//! let handle = launcher
//!     .launch(&JobRequest {
//!         project_id: "my-project".into(),
//!         zone: "us-central1-a".into(),
//!         service_account: "batch@my-project.iam.gserviceaccount.com".into(),
//!         image: "us-central1-docker.pkg.dev/my-project/jobs/nightly".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("started {}", handle.instance_name);
//! ```

pub mod bootstrap;
pub mod config;
pub mod env;
pub mod error;
pub mod gcp;
pub mod handler;
pub mod job;
pub mod launch;
pub mod metadata;
pub mod metrics;
pub mod tracing;
pub mod vm;

// Re-export commonly used types at crate root for convenience
pub use bootstrap::{BootstrapAgent, BootstrapReport, BootstrapState};
pub use error::{BootstrapError, LaunchError, ValidationError};
pub use job::{JobDescriptor, JobRequest, Zone};
pub use launch::{LaunchHandle, Launcher, Provisioner};
