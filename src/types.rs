// src/types.rs

//! Closed vocabularies shared by the planner, the handlers and the driver.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Suffix that marks a replica role in cluster documents (`"slave-replica"`).
pub const REPLICA_ROLE_SUFFIX: &str = "-replica";

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_STOPPED: &str = "stopped";
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_DELETING: &str = "deleting";

/// Infrastructure provider a runtime is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Aliyun,
    QingCloud,
    Kubernetes,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Aws,
        Provider::Aliyun,
        Provider::QingCloud,
        Provider::Kubernetes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Aliyun => "aliyun",
            Provider::QingCloud => "qingcloud",
            Provider::Kubernetes => "kubernetes",
        }
    }

    /// Whether clusters on this provider are made of VM instances.
    pub fn is_vm_based(&self) -> bool {
        !matches!(self, Provider::Kubernetes)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aws" => Ok(Provider::Aws),
            "aliyun" => Ok(Provider::Aliyun),
            "qingcloud" => Ok(Provider::QingCloud),
            "kubernetes" => Ok(Provider::Kubernetes),
            other => Err(format!(
                "invalid provider: {other} (expected aws, aliyun, qingcloud or kubernetes)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    #[default]
    Normal,
    Frontgate,
}

/// Lifecycle operation requested by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobAction {
    CreateCluster,
    StartClusters,
    StopClusters,
    DeleteClusters,
    AddClusterNodes,
    DeleteClusterNodes,
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Primitive action carried by a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskAction {
    RunInstances,
    StopInstances,
    StartInstances,
    DeleteInstances,
    CreateVolumes,
    AttachVolumes,
    DetachVolumes,
    DeleteVolumes,
    WaitFrontgateAvailable,
    RegisterMetadata,
    DeregisterMetadata,
    RegisterNodesMetadata,
    DeregisterNodesMetadata,
    RegisterCmd,
    DeregisterCmd,
    StartConfd,
    StopConfd,
    PingFrontgate,
    PingMetadataBackend,
    SetFrontgateConfig,
    FormatAndMountVolume,
    UmountVolume,
    RemoveContainerOnFrontgate,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Executor a task is dispatched to.
///
/// Serialized as a plain string: `"pilot"` or the provider name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Target {
    Pilot,
    Provider(Provider),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Pilot => f.write_str("pilot"),
            Target::Provider(p) => write!(f, "{p}"),
        }
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.to_string()
    }
}

impl TryFrom<String> for Target {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.trim().eq_ignore_ascii_case("pilot") {
            return Ok(Target::Pilot);
        }
        Provider::from_str(&s).map(Target::Provider)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleKind {
    Primary,
    Replica,
}

/// A node role, decoded once from the `"<base>[-replica]"` naming convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Role {
    pub base_name: String,
    pub kind: RoleKind,
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_suffix(REPLICA_ROLE_SUFFIX) {
            Some(base) => Role {
                base_name: base.to_string(),
                kind: RoleKind::Replica,
            },
            None => Role {
                base_name: raw.to_string(),
                kind: RoleKind::Primary,
            },
        }
    }

    pub fn is_replica(&self) -> bool {
        self.kind == RoleKind::Replica
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RoleKind::Primary => f.write_str(&self.base_name),
            RoleKind::Replica => write!(f, "{}{}", self.base_name, REPLICA_ROLE_SUFFIX),
        }
    }
}

/// Lifecycle service a role may declare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    Init,
    Start,
    Stop,
    ScaleIn,
    ScaleOut,
    Restart,
    Destroy,
    Backup,
    Restore,
    DeleteSnapshot,
    Upgrade,
    Custom(String),
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceKind::Init => "InitService",
            ServiceKind::Start => "StartService",
            ServiceKind::Stop => "StopService",
            ServiceKind::ScaleIn => "ScaleInService",
            ServiceKind::ScaleOut => "ScaleOutService",
            ServiceKind::Restart => "RestartService",
            ServiceKind::Destroy => "DestroyService",
            ServiceKind::Backup => "BackupService",
            ServiceKind::Restore => "RestoreService",
            ServiceKind::DeleteSnapshot => "DeleteSnapshotService",
            ServiceKind::Upgrade => "UpgradeService",
            ServiceKind::Custom(name) => return write!(f, "CustomService({name})"),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_suffix_is_decoded_once() {
        let role = Role::parse("slave-replica");
        assert_eq!(role.base_name, "slave");
        assert!(role.is_replica());
        assert_eq!(role.to_string(), "slave-replica");

        let role = Role::parse("master");
        assert_eq!(role.kind, RoleKind::Primary);
        assert_eq!(role.to_string(), "master");
    }

    #[test]
    fn target_serializes_as_plain_string() {
        let json = serde_json::to_string(&Target::Provider(Provider::QingCloud)).unwrap();
        assert_eq!(json, "\"qingcloud\"");
        let back: Target = serde_json::from_str("\"pilot\"").unwrap();
        assert_eq!(back, Target::Pilot);
        assert!(serde_json::from_str::<Target>("\"openstack\"").is_err());
    }
}
