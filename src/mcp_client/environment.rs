//! Environment resolution for endpoint launches.
//!
//! A variable that is set to the empty string is present; only unset
//! variables are reported missing. Values are kept as `OsString` so a
//! credential reaches the endpoint byte for byte, UTF-8 or not.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ffi::OsString;

/// Read-only view of an environment.
pub trait EnvSource: Send + Sync {
    /// Value of `name`, or `None` when unset.
    fn var(&self, name: &str) -> Option<OsString>;

    /// Value of `name` as text, replacing invalid UTF-8.
    fn var_lossy(&self, name: &str) -> Option<String> {
        self.var(name).map(|v| v.to_string_lossy().into_owned())
    }
}

/// The gateway process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<OsString> {
        std::env::var_os(name)
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<OsString> {
        self.get(name).map(OsString::from)
    }
}

impl EnvSource for HashMap<String, OsString> {
    fn var(&self, name: &str) -> Option<OsString> {
        self.get(name).cloned()
    }
}

/// Complete key/value set for one endpoint's required variables.
pub type ResolvedEnv = BTreeMap<String, OsString>;

/// Resolve every required name, or return the sorted list of missing names.
pub fn resolve(
    env: &dyn EnvSource,
    required: &BTreeSet<String>,
) -> Result<ResolvedEnv, Vec<String>> {
    let mut resolved = ResolvedEnv::new();
    let mut missing = Vec::new();

    for name in required {
        match env.var(name) {
            Some(value) => {
                resolved.insert(name.clone(), value);
            }
            None => missing.push(name.clone()),
        }
    }

    if missing.is_empty() {
        Ok(resolved)
    } else {
        Err(missing)
    }
}

/// Names from `required` that are unset, sorted.
pub fn missing(env: &dyn EnvSource, required: &BTreeSet<String>) -> Vec<String> {
    required
        .iter()
        .filter(|name| env.var(name).is_none())
        .cloned()
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
