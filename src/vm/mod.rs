//! Compute Engine instance specs
//!
//! This module turns a validated job into the request body for
//! `instances.insert`:
//! - `config` - serde types mirroring the Compute Engine instance resource
//! - `builder` - name generation and the fixed launch policy

pub mod builder;
pub mod config;

pub use builder::{generate_instance_name, InstanceSpecBuilder, LaunchPolicy};
pub use config::*;
