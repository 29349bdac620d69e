//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use runbatch::bootstrap::{
    BoxError, InstanceReaper, JobLog, ResolvedEnvironment, SecretStore, Severity, WorkloadRunner,
};
use runbatch::error::{ProvisioningError, WorkloadError};
use runbatch::job::Zone;
use runbatch::vm::InstanceSpec;
use runbatch::Provisioner;

/// Keeps every submitted spec
#[derive(Default)]
pub struct CapturingProvisioner {
    pub specs: Mutex<Vec<InstanceSpec>>,
}

#[async_trait]
impl Provisioner for CapturingProvisioner {
    async fn create_instance(
        &self,
        _project_id: &str,
        _zone: &Zone,
        spec: &InstanceSpec,
    ) -> Result<(), ProvisioningError> {
        self.specs.lock().unwrap().push(spec.clone());
        Ok(())
    }
}

/// Secret payloads by reference; unknown references fail
#[derive(Default)]
pub struct FakeSecrets {
    pub payloads: HashMap<String, String>,
    pub accessed: Mutex<Vec<String>>,
}

impl FakeSecrets {
    pub fn with(payloads: &[(&str, &str)]) -> Self {
        Self {
            payloads: payloads
                .iter()
                .map(|(r, p)| (r.to_string(), p.to_string()))
                .collect(),
            accessed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SecretStore for FakeSecrets {
    async fn access(&self, reference: &str) -> Result<String, BoxError> {
        self.accessed.lock().unwrap().push(reference.to_string());
        self.payloads
            .get(reference)
            .cloned()
            .ok_or_else(|| format!("NOT_FOUND: {reference}").into())
    }
}

/// How the fake workload behaves
#[derive(Clone, Copy)]
pub enum Behavior {
    Exit(i32),
    FailPrepare,
    FailSpawn,
    Hang,
}

pub struct FakeRunner {
    pub behavior: Behavior,
    pub runs: Mutex<Vec<(String, ResolvedEnvironment)>>,
    pub aborts: AtomicUsize,
}

impl FakeRunner {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            runs: Mutex::new(Vec::new()),
            aborts: AtomicUsize::new(0),
        }
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkloadRunner for FakeRunner {
    async fn prepare(&self) -> Result<(), WorkloadError> {
        match self.behavior {
            Behavior::FailPrepare => Err(WorkloadError::Prepare("credential helper missing".into())),
            _ => Ok(()),
        }
    }

    async fn run(
        &self,
        image: &str,
        env: &ResolvedEnvironment,
        log: &dyn JobLog,
    ) -> Result<i32, WorkloadError> {
        self.runs
            .lock()
            .unwrap()
            .push((image.to_string(), env.clone()));
        match self.behavior {
            Behavior::Exit(code) => {
                log.log(Severity::Info, "hello from the job").await;
                Ok(code)
            }
            Behavior::FailSpawn => Err(WorkloadError::Spawn(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "docker not found",
            ))),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(0)
            }
            Behavior::FailPrepare => Ok(0),
        }
    }

    async fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts deletions; optionally fails them
#[derive(Default)]
pub struct CountingReaper {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl CountingReaper {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstanceReaper for CountingReaper {
    async fn delete_self(&self) -> Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err("PERMISSION_DENIED: compute.instances.delete".into());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLog {
    pub entries: Mutex<Vec<(Severity, String)>>,
}

impl MemoryLog {
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|(s, line)| *s == severity && line.contains(needle))
    }
}

#[async_trait]
impl JobLog for MemoryLog {
    async fn log(&self, severity: Severity, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}
