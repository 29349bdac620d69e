//! Launcher configuration shared by the CLI and the HTTP handler
//!
//! Machine settings default to [`LaunchPolicy`] and can be overridden by a
//! flag or environment variable. The bootstrap has no default: either an agent
//! image or a complete startup script must be configured.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::gcp::{token_source_from_env, ApiClient, ComputeClient};
use crate::launch::Launcher;
use crate::metadata::BootstrapScript;
use crate::vm::{InstanceSpecBuilder, LaunchPolicy};

/// Machine shape and bootstrap settings for launched instances
#[derive(Debug, Clone, Default, clap::Args)]
pub struct LauncherArgs {
    /// Container image of the bootstrap agent run by the built-in startup script
    /// (build it from guest/agent/Dockerfile)
    #[arg(
        long,
        env = "RUNBATCH_AGENT_IMAGE",
        required_unless_present = "bootstrap_script"
    )]
    pub agent_image: Option<String>,

    /// Use this file as the instance startup script instead of the built-in one
    #[arg(long, env = "RUNBATCH_BOOTSTRAP_SCRIPT")]
    pub bootstrap_script: Option<PathBuf>,

    /// Machine type for launched instances
    #[arg(long, env = "RUNBATCH_MACHINE_TYPE")]
    pub machine_type: Option<String>,

    /// Boot disk size in GB
    #[arg(long, env = "RUNBATCH_DISK_SIZE_GB")]
    pub disk_size_gb: Option<u64>,
}

impl LauncherArgs {
    /// Default policy with the overrides applied
    pub fn policy(&self) -> LaunchPolicy {
        let mut policy = LaunchPolicy::default();
        if let Some(machine_type) = &self.machine_type {
            policy.machine_type = machine_type.clone();
        }
        if let Some(disk_size_gb) = self.disk_size_gb {
            policy.disk_size_gb = disk_size_gb;
        }
        policy
    }

    /// The startup script; reads the override file if one is configured
    pub fn bootstrap_script(&self) -> io::Result<BootstrapScript> {
        match (&self.bootstrap_script, &self.agent_image) {
            (Some(path), _) => BootstrapScript::from_file(path),
            (None, Some(image)) => Ok(BootstrapScript::for_agent_image(image)),
            (None, None) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no agent image or bootstrap script configured",
            )),
        }
    }

    pub fn spec_builder(&self) -> io::Result<InstanceSpecBuilder> {
        Ok(InstanceSpecBuilder::new(self.policy(), self.bootstrap_script()?))
    }

    /// Launcher backed by the Compute Engine API, authenticated from the environment
    pub fn launcher(&self) -> io::Result<Launcher> {
        let api = ApiClient::new(token_source_from_env());
        Ok(Launcher::new(
            self.spec_builder()?,
            Arc::new(ComputeClient::new(api)),
        ))
    }
}
