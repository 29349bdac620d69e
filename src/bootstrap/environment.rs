//! Resolved environment for the workload container
//!
//! Precedence, lowest to highest:
//!
//! 1. secret payloads, in the order they are listed (later wins)
//! 2. plaintext `jsonEnv` (wins over every secret)

use std::collections::btree_map;
use std::fmt;

use crate::env::EnvMap;

/// Final variables injected into the container. Never persisted.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResolvedEnvironment(EnvMap);

impl ResolvedEnvironment {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    pub fn into_inner(self) -> EnvMap {
        self.0
    }
}

// Values may be secrets, so only names are printed.
impl fmt::Debug for ResolvedEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Merge secret envs (in order) and then the plaintext env on top
pub fn resolve_environment<I>(secret_envs: I, plaintext: EnvMap) -> ResolvedEnvironment
where
    I: IntoIterator<Item = EnvMap>,
{
    let mut merged = EnvMap::new();
    for secret_env in secret_envs {
        merged.extend(secret_env);
    }
    merged.extend(plaintext);
    ResolvedEnvironment(merged)
}
