// src/model/job.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{JobAction, Provider};

/// A lifecycle job as handed over by the job service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    #[serde(default)]
    pub owner: String,
    pub cluster_id: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub version_id: String,
    pub job_action: JobAction,
    pub provider: Provider,
    pub runtime_id: String,
    /// Serialized cluster document (see `RawClusterWrapper`).
    pub directive: String,
}

/// Runtime a cluster is deployed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeDetails {
    pub runtime_id: String,
    pub provider: Provider,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub credential: Credential,
}

/// Provider credential. Never printed.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct Credential(pub String);

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_is_redacted_in_debug_output() {
        let runtime = RuntimeDetails {
            runtime_id: "rt-1".to_string(),
            provider: Provider::QingCloud,
            zone: "pek3".to_string(),
            url: String::new(),
            credential: Credential("secret-key".to_string()),
        };
        let printed = format!("{runtime:?}");
        assert!(!printed.contains("secret-key"));
    }
}
