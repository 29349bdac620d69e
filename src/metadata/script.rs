//! Bootstrap script installed as the instance `startup-script`
//!
//! The body is the same for every launch from a given deployment. It starts
//! the `runbatch-agent` container, which does the real work, and only deletes
//! the instance itself if the agent could not finish the job of doing so.
//!
//! The agent image is built from `guest/agent/Dockerfile` and pushed by the
//! deployment; there is no public default.

use std::path::Path;

const AGENT_IMAGE_PLACEHOLDER: &str = "@AGENT_IMAGE@";

const TEMPLATE: &str = r#"#!/bin/bash
# runbatch startup script. Runs the runbatch agent, which runs the job
# container and deletes this instance when it exits. A non-zero agent exit
# means self-deletion did not happen, so do it here.
set -u

readonly AGENT_IMAGE="@AGENT_IMAGE@"
readonly MD="http://metadata.google.internal/computeMetadata/v1"

# Root's home is read-only on Container-Optimized OS.
export HOME=/home/chronos
docker-credential-gcr configure-docker --registries "${AGENT_IMAGE%%/*}" >/dev/null 2>&1 || true

docker run --rm --network host \
  --volume /var/run/docker.sock:/var/run/docker.sock \
  "${AGENT_IMAGE}" && exit 0

echo "runbatch: agent did not delete the instance, deleting from startup script" >&2
md() { curl -sf -H "Metadata-Flavor: Google" "${MD}/$1"; }
token="$(md instance/service-accounts/default/token | sed -E 's/.*"access_token":"([^"]+)".*/\1/')"
project="$(md project/project-id)"
zone="$(md instance/zone)"
name="$(md instance/name)"
curl -sf -X DELETE -H "Authorization: Bearer ${token}" \
  "https://compute.googleapis.com/compute/v1/projects/${project}/${zone#projects/*/}/instances/${name}"
"#;

/// Immutable startup-script body, fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapScript(String);

impl BootstrapScript {
    /// Render the built-in script for the given agent image
    pub fn for_agent_image(agent_image: &str) -> Self {
        BootstrapScript(TEMPLATE.replace(AGENT_IMAGE_PLACEHOLDER, agent_image))
    }

    /// Use a complete script body supplied by the deployment
    pub fn custom(body: impl Into<String>) -> Self {
        BootstrapScript(body.into())
    }

    /// Read a custom script body from disk
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        std::fs::read_to_string(path).map(BootstrapScript)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
