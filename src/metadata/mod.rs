//! Configuration channel between the launcher and the VM
//!
//! The metadata server hands attributes to the guest as flat strings, so the
//! job travels as four separate keys rather than one structured document:
//!
//! ```text
//! startup-script              bootstrap script body (same for every job)
//! runbatch-image              container image, unmodified
//! runbatch-json-env           plaintext env JSON, or ""
//! runbatch-secret-json-envs   comma-joined secret references, or ""
//! ```
//!
//! The launcher always writes all four keys. The channel is write-once: the
//! guest never writes back.

pub mod script;

use std::collections::HashMap;

use crate::env::{parse_env_json, EnvMap};
use crate::error::BootstrapError;
use crate::job::JobDescriptor;
use crate::vm::config::{Metadata, MetadataItem};

pub use script::BootstrapScript;

pub const STARTUP_SCRIPT_KEY: &str = "startup-script";
pub const IMAGE_KEY: &str = "runbatch-image";
pub const JSON_ENV_KEY: &str = "runbatch-json-env";
pub const SECRET_JSON_ENVS_KEY: &str = "runbatch-secret-json-envs";

/// The per-job part of the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPayload {
    /// Container image reference
    pub image: String,
    /// Raw plaintext env JSON; empty means no plaintext env
    pub json_env: String,
    /// Comma-joined secret references; empty means no secrets
    pub secret_json_envs: String,
}

impl ChannelPayload {
    pub fn from_descriptor(descriptor: &JobDescriptor) -> Self {
        Self {
            image: descriptor.image().to_string(),
            json_env: descriptor.env_json().to_string(),
            secret_json_envs: descriptor.secret_refs().join(","),
        }
    }

    /// Encode as instance metadata, script first
    pub fn to_metadata(&self, script: &BootstrapScript) -> Metadata {
        let item = |key: &str, value: &str| MetadataItem {
            key: key.to_string(),
            value: value.to_string(),
        };
        Metadata {
            items: vec![
                item(STARTUP_SCRIPT_KEY, script.as_str()),
                item(IMAGE_KEY, &self.image),
                item(JSON_ENV_KEY, &self.json_env),
                item(SECRET_JSON_ENVS_KEY, &self.secret_json_envs),
            ],
        }
    }

    /// Decode from the attribute map the guest reads from the metadata server.
    ///
    /// The image key must be present. The env and secret keys read as empty
    /// when absent, which is the same thing the launcher means by "".
    pub fn from_attributes(attributes: &HashMap<String, String>) -> Result<Self, BootstrapError> {
        Self::decode(|key| attributes.get(key).map(String::as_str))
    }

    /// Decode from a built metadata block
    pub fn from_metadata(metadata: &Metadata) -> Result<Self, BootstrapError> {
        Self::decode(|key| metadata.get(key))
    }

    fn decode<'a>(lookup: impl Fn(&str) -> Option<&'a str>) -> Result<Self, BootstrapError> {
        let image = lookup(IMAGE_KEY)
            .filter(|image| !image.is_empty())
            .ok_or(BootstrapError::MissingKey(IMAGE_KEY))?;
        Ok(Self {
            image: image.to_string(),
            json_env: lookup(JSON_ENV_KEY).unwrap_or_default().to_string(),
            secret_json_envs: lookup(SECRET_JSON_ENVS_KEY).unwrap_or_default().to_string(),
        })
    }

    /// Secret references in listed order, ignoring empty segments
    pub fn secret_refs(&self) -> Vec<&str> {
        self.secret_json_envs
            .split(',')
            .map(str::trim)
            .filter(|reference| !reference.is_empty())
            .collect()
    }

    /// Plaintext env; an empty string is an empty map
    pub fn plaintext_env(&self) -> Result<EnvMap, BootstrapError> {
        parse_env_json(&self.json_env).map_err(|e| BootstrapError::PlaintextEnv(e.to_string()))
    }
}
