//! Instance spec builder - turns a job into an `instances.insert` body
//!
//! Everything except the name suffix is a deterministic function of the
//! `JobDescriptor`, the `LaunchPolicy`, and the bootstrap script. The machine
//! shape, disk, and network are policy, not per-job input: this tool only runs
//! short-lived single-container jobs.

use std::collections::BTreeMap;

use rand::rngs::OsRng;
use rand::RngCore;

use super::config::*;
use crate::error::LaunchError;
use crate::job::JobDescriptor;
use crate::metadata::{BootstrapScript, ChannelPayload};

/// Random bytes in the instance name suffix (12 hex characters)
pub const NAME_SUFFIX_BYTES: usize = 6;

/// Label put on every instance this tool creates
pub const MANAGED_LABEL: &str = "runbatch-managed";

/// Broadest OAuth scope; actual permissions come from the service account's IAM roles
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Fixed machine shape and boot disk for every launched job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPolicy {
    /// Machine type name within the zone
    pub machine_type: String,
    /// Boot disk size in GB
    pub disk_size_gb: u64,
    /// Disk type name within the zone
    pub disk_type: String,
    /// Boot image (or image family) for the disk
    pub source_image: String,
    /// Network tier of the external address
    pub network_tier: String,
}

impl Default for LaunchPolicy {
    fn default() -> Self {
        Self {
            machine_type: "e2-micro".to_string(),
            disk_size_gb: 10,
            disk_type: "pd-balanced".to_string(),
            source_image: "projects/cos-cloud/global/images/family/cos-stable".to_string(),
            network_tier: "PREMIUM".to_string(),
        }
    }
}

/// Builds instance specs from job descriptors
#[derive(Debug, Clone)]
pub struct InstanceSpecBuilder {
    policy: LaunchPolicy,
    script: BootstrapScript,
}

impl InstanceSpecBuilder {
    pub fn new(policy: LaunchPolicy, script: BootstrapScript) -> Self {
        Self { policy, script }
    }

    pub fn policy(&self) -> &LaunchPolicy {
        &self.policy
    }

    /// Build a spec, drawing the name suffix from the OS random source
    pub fn build(&self, descriptor: &JobDescriptor) -> Result<InstanceSpec, LaunchError> {
        self.build_with_rng(descriptor, &mut OsRng)
    }

    /// Build a spec with an explicit random source
    ///
    /// A failure to produce random bytes aborts the build.
    pub fn build_with_rng<R: RngCore + ?Sized>(
        &self,
        descriptor: &JobDescriptor,
        rng: &mut R,
    ) -> Result<InstanceSpec, LaunchError> {
        let name = generate_instance_name(descriptor.machine_prefix(), rng)
            .map_err(LaunchError::Randomness)?;

        let project = descriptor.project_id();
        let zone = descriptor.zone();
        let region = zone.region();
        let policy = &self.policy;

        let payload = ChannelPayload::from_descriptor(descriptor);

        Ok(InstanceSpec {
            name,
            machine_type: format!(
                "projects/{project}/zones/{zone}/machineTypes/{}",
                policy.machine_type
            ),
            disks: vec![AttachedDisk {
                auto_delete: true,
                boot: true,
                disk_type: "PERSISTENT".to_string(),
                initialize_params: AttachedDiskInitializeParams {
                    disk_size_gb: policy.disk_size_gb,
                    disk_type: format!(
                        "projects/{project}/zones/{zone}/diskTypes/{}",
                        policy.disk_type
                    ),
                    source_image: policy.source_image.clone(),
                },
            }],
            network_interfaces: vec![NetworkInterface {
                subnetwork: format!("projects/{project}/regions/{region}/subnetworks/default"),
                access_configs: vec![AccessConfig {
                    name: "External NAT".to_string(),
                    access_type: "ONE_TO_ONE_NAT".to_string(),
                    network_tier: policy.network_tier.clone(),
                }],
            }],
            metadata: payload.to_metadata(&self.script),
            service_accounts: vec![ServiceAccount {
                email: descriptor.service_account().to_string(),
                scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
            }],
            labels: BTreeMap::from([(MANAGED_LABEL.to_string(), "true".to_string())]),
        })
    }
}

/// `{prefix}-{12 lower-case hex chars}` from [`NAME_SUFFIX_BYTES`] random bytes
pub fn generate_instance_name<R: RngCore + ?Sized>(
    prefix: &str,
    rng: &mut R,
) -> Result<String, rand::Error> {
    let mut suffix = [0u8; NAME_SUFFIX_BYTES];
    rng.try_fill_bytes(&mut suffix)?;
    Ok(format!("{prefix}-{}", hex::encode(suffix)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::job::JobRequest;
    use crate::metadata::{IMAGE_KEY, JSON_ENV_KEY, SECRET_JSON_ENVS_KEY, STARTUP_SCRIPT_KEY};

    /// Random source that always fails, for the entropy-failure path
    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            unreachable!("only try_fill_bytes is used")
        }

        fn next_u64(&mut self) -> u64 {
            unreachable!("only try_fill_bytes is used")
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {
            unreachable!("only try_fill_bytes is used")
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "entropy source unavailable",
            )))
        }
    }

    fn descriptor() -> JobDescriptor {
        JobRequest {
            project_id: "acme-batch".to_string(),
            zone: "us-central1-a".to_string(),
            service_account: "jobs@acme-batch.iam.gserviceaccount.com".to_string(),
            machine_prefix: "nightly".to_string(),
            image: "us-central1-docker.pkg.dev/acme-batch/jobs/etl:7".to_string(),
            json_env: r#"{"FOO":"1"}"#.to_string(),
            secret_json_envs: vec!["s1".to_string(), "s2".to_string()],
        }
        .validate()
        .unwrap()
    }

    fn builder() -> InstanceSpecBuilder {
        InstanceSpecBuilder::new(
            LaunchPolicy::default(),
            BootstrapScript::for_agent_image("gcr.io/acme-batch/runbatch-agent:1"),
        )
    }

    #[test]
    fn test_spec_layout() {
        let spec = builder().build(&descriptor()).unwrap();

        assert_eq!(
            spec.machine_type,
            "projects/acme-batch/zones/us-central1-a/machineTypes/e2-micro"
        );

        assert_eq!(spec.disks.len(), 1);
        let disk = &spec.disks[0];
        assert!(disk.auto_delete && disk.boot);
        assert_eq!(disk.initialize_params.disk_size_gb, 10);
        assert_eq!(
            disk.initialize_params.disk_type,
            "projects/acme-batch/zones/us-central1-a/diskTypes/pd-balanced"
        );
        assert_eq!(
            disk.initialize_params.source_image,
            "projects/cos-cloud/global/images/family/cos-stable"
        );

        assert_eq!(spec.network_interfaces.len(), 1);
        let nic = &spec.network_interfaces[0];
        assert_eq!(
            nic.subnetwork,
            "projects/acme-batch/regions/us-central1/subnetworks/default"
        );
        assert_eq!(nic.access_configs[0].access_type, "ONE_TO_ONE_NAT");

        assert_eq!(spec.service_accounts.len(), 1);
        assert_eq!(
            spec.service_accounts[0].email,
            "jobs@acme-batch.iam.gserviceaccount.com"
        );
        assert_eq!(spec.service_accounts[0].scopes, vec![CLOUD_PLATFORM_SCOPE]);

        assert_eq!(spec.labels.get(MANAGED_LABEL).map(String::as_str), Some("true"));
    }

    #[test]
    fn test_metadata_channel_embedded() {
        let script = BootstrapScript::custom("#!/bin/sh\necho hi\n");
        let builder = InstanceSpecBuilder::new(LaunchPolicy::default(), script.clone());
        let spec = builder.build(&descriptor()).unwrap();

        let keys: Vec<&str> = spec.metadata.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![STARTUP_SCRIPT_KEY, IMAGE_KEY, JSON_ENV_KEY, SECRET_JSON_ENVS_KEY]
        );
        assert_eq!(spec.metadata.get(STARTUP_SCRIPT_KEY), Some(script.as_str()));
        assert_eq!(
            spec.metadata.get(IMAGE_KEY),
            Some("us-central1-docker.pkg.dev/acme-batch/jobs/etl:7")
        );
        assert_eq!(spec.metadata.get(JSON_ENV_KEY), Some(r#"{"FOO":"1"}"#));
        assert_eq!(spec.metadata.get(SECRET_JSON_ENVS_KEY), Some("s1,s2"));
    }

    #[test]
    fn test_policy_overrides() {
        let policy = LaunchPolicy {
            machine_type: "e2-standard-4".to_string(),
            disk_size_gb: 50,
            ..LaunchPolicy::default()
        };
        let spec = InstanceSpecBuilder::new(policy, BootstrapScript::custom("#!/bin/sh\n"))
            .build(&descriptor())
            .unwrap();
        assert!(spec.machine_type.ends_with("/machineTypes/e2-standard-4"));
        assert_eq!(spec.disks[0].initialize_params.disk_size_gb, 50);
    }

    #[test]
    fn test_instance_name_format() {
        let spec = builder().build(&descriptor()).unwrap();
        let suffix = spec.name.strip_prefix("nightly-").unwrap();
        assert_eq!(suffix.len(), NAME_SUFFIX_BYTES * 2);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_instance_names_do_not_collide() {
        let mut names = HashSet::new();
        for _ in 0..10_000 {
            let name = generate_instance_name("runbatch", &mut OsRng).unwrap();
            assert!(names.insert(name), "duplicate instance name generated");
        }
    }

    #[test]
    fn test_randomness_failure_aborts_build() {
        let err = builder()
            .build_with_rng(&descriptor(), &mut BrokenRng)
            .unwrap_err();
        assert!(matches!(err, LaunchError::Randomness(_)));
    }
}
