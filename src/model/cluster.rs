// src/model/cluster.rs

//! Cluster documents.
//!
//! [`RawClusterWrapper`] is the JSON shape carried in a job directive.
//! [`ClusterWrapper`] is the validated form every frame works from: roles are
//! decoded into [`Role`], services into [`ServiceSpec`], and defaults
//! (instance size, filesystem, mount options, env) are resolved.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::DefaultsSection;
use crate::errors::{PitrixError, Result};
use crate::model::service::{ServiceSpec, decode_custom_services, decode_service};
use crate::types::{ClusterType, Role, STATUS_ACTIVE, ServiceKind};

pub const EXT4_MOUNT_OPTIONS: &str = "defaults,noatime";
pub const XFS_MOUNT_OPTIONS: &str = "rw,noatime,inode64,allocsize=16m";

static MOUNT_POINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9._-]+(/[A-Za-z0-9._-]+)*)?$").expect("valid regex"));

/// Cluster document as found in a job directive.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RawClusterWrapper {
    pub cluster: RawCluster,
    pub cluster_nodes: BTreeMap<String, RawClusterNode>,
    pub cluster_roles: BTreeMap<String, RawClusterRole>,
    pub cluster_commons: BTreeMap<String, RawClusterCommon>,
    pub cluster_links: BTreeMap<String, ClusterLink>,
    pub cluster_loadbalancers: BTreeMap<String, Vec<ClusterLoadbalancer>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RawCluster {
    pub cluster_id: String,
    pub name: String,
    pub app_id: String,
    pub version_id: String,
    pub owner: String,
    pub runtime_id: String,
    pub zone: String,
    pub subnet_id: String,
    pub vpc_id: String,
    pub frontgate_id: String,
    pub cluster_type: ClusterType,
    pub status: String,
    pub transition_status: String,
    pub global_uuid: String,
    /// JSON object of environment values shared by all roles.
    pub env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RawClusterRole {
    pub cpu: u32,
    pub memory: u32,
    pub gpu: u32,
    pub instance_class: i32,
    pub storage_size: i64,
    /// Comma separated mount points.
    pub mount_point: String,
    pub file_system: String,
    pub mount_options: String,
    pub instance_size: i64,
    /// JSON object of role level environment values.
    pub env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawClusterCommon {
    pub init_service: String,
    pub start_service: String,
    pub stop_service: String,
    pub scale_in_service: String,
    pub scale_out_service: String,
    pub restart_service: String,
    pub destroy_service: String,
    pub backup_service: String,
    pub restore_service: String,
    pub delete_snapshot_service: String,
    pub upgrade_service: String,
    pub custom_service: String,
    pub image_id: String,
    pub hypervisor: String,
    pub health_check: String,
    pub monitor: String,
    pub agent_installed: bool,
    pub passphraseless: String,
}

impl Default for RawClusterCommon {
    fn default() -> Self {
        Self {
            init_service: String::new(),
            start_service: String::new(),
            stop_service: String::new(),
            scale_in_service: String::new(),
            scale_out_service: String::new(),
            restart_service: String::new(),
            destroy_service: String::new(),
            backup_service: String::new(),
            restore_service: String::new(),
            delete_snapshot_service: String::new(),
            upgrade_service: String::new(),
            custom_service: String::new(),
            image_id: String::new(),
            hypervisor: String::new(),
            health_check: String::new(),
            monitor: String::new(),
            agent_installed: true,
            passphraseless: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RawClusterNode {
    pub role: String,
    pub server_id: u32,
    pub group_id: u32,
    pub instance_id: String,
    pub volume_id: String,
    pub device: String,
    pub private_ip: String,
    pub subnet_id: String,
    pub status: String,
    pub transition_status: String,
    pub pub_key: String,
    pub custom_metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterLink {
    pub name: String,
    pub external_cluster_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterLoadbalancer {
    pub loadbalancer_listener_id: String,
    pub loadbalancer_port: u32,
    pub loadbalancer_policy_id: String,
}

/// Cluster-wide facts after validation.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub cluster_id: String,
    pub name: String,
    pub app_id: String,
    pub version_id: String,
    pub owner: String,
    pub runtime_id: String,
    pub zone: String,
    pub subnet_id: String,
    pub vpc_id: String,
    pub frontgate_id: String,
    pub cluster_type: ClusterType,
    pub status: String,
    pub transition_status: String,
    pub global_uuid: String,
    pub env: Map<String, Value>,
}

impl Cluster {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

/// Shape shared by every node of one role.
#[derive(Debug, Clone)]
pub struct ClusterRole {
    pub name: String,
    pub cpu: u32,
    pub memory: u32,
    pub gpu: u32,
    pub instance_class: i32,
    pub storage_size: i64,
    pub mount_points: Vec<String>,
    pub file_system: String,
    pub mount_options: String,
    pub instance_size: i64,
    pub env: Map<String, Value>,
}

impl ClusterRole {
    /// Size of each volume when storage is split across mount points.
    pub fn volume_size_per_mount(&self) -> i64 {
        if self.mount_points.is_empty() {
            return 0;
        }
        self.storage_size / self.mount_points.len() as i64
    }

    pub fn needs_storage(&self) -> bool {
        self.storage_size > 0 && !self.mount_points.is_empty()
    }
}

/// Lifecycle services and image facts of one role.
#[derive(Debug, Clone)]
pub struct ClusterCommon {
    pub role: String,
    pub services: BTreeMap<ServiceKind, ServiceSpec>,
    pub image_id: String,
    pub hypervisor: String,
    pub health_check: String,
    pub monitor: String,
    pub agent_installed: bool,
    pub passphraseless: String,
}

impl ClusterCommon {
    pub fn service(&self, kind: &ServiceKind) -> Option<&ServiceSpec> {
        self.services.get(kind)
    }
}

#[derive(Debug, Clone)]
pub struct ClusterNode {
    pub node_id: String,
    pub role: Role,
    pub server_id: u32,
    pub group_id: u32,
    pub instance_id: String,
    pub volume_id: String,
    pub device: String,
    pub private_ip: String,
    pub subnet_id: String,
    pub status: String,
    pub transition_status: String,
    pub pub_key: String,
    /// Token from the node's custom metadata, if any.
    pub token: Option<String>,
}

/// Validated desired state of one cluster.
#[derive(Debug, Clone)]
pub struct ClusterWrapper {
    pub cluster: Cluster,
    /// Keyed by base role name.
    pub roles: BTreeMap<String, ClusterRole>,
    /// Keyed by base role name.
    pub commons: BTreeMap<String, ClusterCommon>,
    pub nodes: BTreeMap<String, ClusterNode>,
    pub links: BTreeMap<String, ClusterLink>,
    pub loadbalancers: BTreeMap<String, Vec<ClusterLoadbalancer>>,
}

impl ClusterWrapper {
    /// Parse and validate a job directive.
    pub fn from_directive(directive: &str, defaults: &DefaultsSection) -> Result<Self> {
        let raw: RawClusterWrapper = serde_json::from_str(directive)?;
        Self::from_raw(raw, defaults)
    }

    pub fn from_raw(raw: RawClusterWrapper, defaults: &DefaultsSection) -> Result<Self> {
        if raw.cluster.cluster_id.is_empty() {
            return Err(PitrixError::InvalidCluster(
                "cluster.cluster_id must not be empty".to_string(),
            ));
        }

        let cluster = convert_cluster(raw.cluster)?;

        let mut roles = BTreeMap::new();
        for (name, raw_role) in raw.cluster_roles {
            let role = convert_role(&name, raw_role, &cluster.env, defaults)?;
            roles.insert(name, role);
        }

        let mut commons = BTreeMap::new();
        for (name, raw_common) in raw.cluster_commons {
            let common = convert_common(&name, raw_common)?;
            commons.insert(name, common);
        }

        let mut nodes = BTreeMap::new();
        for (node_id, raw_node) in raw.cluster_nodes {
            let node = convert_node(&node_id, raw_node);
            if !roles.contains_key(&node.role.base_name) {
                return Err(PitrixError::MissingRole {
                    node_id,
                    role: node.role.to_string(),
                });
            }
            if !commons.contains_key(&node.role.base_name) {
                return Err(PitrixError::MissingCommon {
                    node_id,
                    role: node.role.to_string(),
                });
            }
            nodes.insert(node_id, node);
        }

        debug!(
            cluster_id = %cluster.cluster_id,
            roles = roles.len(),
            nodes = nodes.len(),
            "validated cluster wrapper"
        );

        Ok(Self {
            cluster,
            roles,
            commons,
            nodes,
            links: raw.cluster_links,
            loadbalancers: raw.cluster_loadbalancers,
        })
    }

    pub fn node(&self, node_id: &str) -> Result<&ClusterNode> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| PitrixError::MissingNode(node_id.to_string()))
    }

    /// Role shape of the given node (replicas resolve to their base role).
    pub fn role_of(&self, node: &ClusterNode) -> Result<&ClusterRole> {
        self.roles
            .get(&node.role.base_name)
            .ok_or_else(|| PitrixError::MissingRole {
                node_id: node.node_id.clone(),
                role: node.role.to_string(),
            })
    }

    pub fn common_of(&self, node: &ClusterNode) -> Result<&ClusterCommon> {
        self.commons
            .get(&node.role.base_name)
            .ok_or_else(|| PitrixError::MissingCommon {
                node_id: node.node_id.clone(),
                role: node.role.to_string(),
            })
    }

    /// All node ids in deterministic (sorted) order.
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn node_ids_with_status(&self, status: &str) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| n.status == status)
            .map(|n| n.node_id.clone())
            .collect()
    }

    pub fn node_ids_without_status(&self, status: &str) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| n.status != status)
            .map(|n| n.node_id.clone())
            .collect()
    }
}

impl TryFrom<RawClusterWrapper> for ClusterWrapper {
    type Error = PitrixError;

    fn try_from(raw: RawClusterWrapper) -> std::result::Result<Self, Self::Error> {
        ClusterWrapper::from_raw(raw, &DefaultsSection::default())
    }
}

fn parse_env(owner: &str, raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(PitrixError::InvalidCluster(format!(
            "env of {owner} must be a JSON object, got {other}"
        ))),
    }
}

fn convert_cluster(raw: RawCluster) -> Result<Cluster> {
    let env = parse_env("cluster", &raw.env)?;
    Ok(Cluster {
        cluster_id: raw.cluster_id,
        name: raw.name,
        app_id: raw.app_id,
        version_id: raw.version_id,
        owner: raw.owner,
        runtime_id: raw.runtime_id,
        zone: raw.zone,
        subnet_id: raw.subnet_id,
        vpc_id: raw.vpc_id,
        frontgate_id: raw.frontgate_id,
        cluster_type: raw.cluster_type,
        status: raw.status,
        transition_status: raw.transition_status,
        global_uuid: raw.global_uuid,
        env,
    })
}

/// Default mount options for a filesystem.
pub fn default_mount_options(file_system: &str) -> &'static str {
    match file_system {
        "xfs" => XFS_MOUNT_OPTIONS,
        _ => EXT4_MOUNT_OPTIONS,
    }
}

fn convert_role(
    name: &str,
    raw: RawClusterRole,
    cluster_env: &Map<String, Value>,
    defaults: &DefaultsSection,
) -> Result<ClusterRole> {
    let mut mount_points: Vec<String> = raw
        .mount_point
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if mount_points.is_empty() && raw.storage_size > 0 {
        mount_points.push(defaults.mount_point.clone());
    }
    if let Some(bad) = mount_points.iter().find(|m| !MOUNT_POINT_RE.is_match(m)) {
        return Err(PitrixError::InvalidCluster(format!(
            "role '{name}' has invalid mount point '{bad}'"
        )));
    }

    let file_system = if raw.file_system.is_empty() {
        defaults.file_system.clone()
    } else {
        raw.file_system
    };
    let mount_options = if raw.mount_options.is_empty() {
        default_mount_options(&file_system).to_string()
    } else {
        raw.mount_options
    };
    let instance_size = if raw.instance_size == 0 {
        defaults.instance_size
    } else {
        raw.instance_size
    };

    let role_env = parse_env(&format!("role '{name}'"), &raw.env)?;
    let env = if role_env.is_empty() {
        cluster_env.clone()
    } else {
        role_env
    };

    Ok(ClusterRole {
        name: name.to_string(),
        cpu: raw.cpu,
        memory: raw.memory,
        gpu: raw.gpu,
        instance_class: raw.instance_class,
        storage_size: raw.storage_size,
        mount_points,
        file_system,
        mount_options,
        instance_size,
        env,
    })
}

fn convert_common(role: &str, raw: RawClusterCommon) -> Result<ClusterCommon> {
    let declared = [
        (ServiceKind::Init, &raw.init_service),
        (ServiceKind::Start, &raw.start_service),
        (ServiceKind::Stop, &raw.stop_service),
        (ServiceKind::ScaleIn, &raw.scale_in_service),
        (ServiceKind::ScaleOut, &raw.scale_out_service),
        (ServiceKind::Restart, &raw.restart_service),
        (ServiceKind::Destroy, &raw.destroy_service),
        (ServiceKind::Backup, &raw.backup_service),
        (ServiceKind::Restore, &raw.restore_service),
        (ServiceKind::DeleteSnapshot, &raw.delete_snapshot_service),
        (ServiceKind::Upgrade, &raw.upgrade_service),
    ];

    let mut services = BTreeMap::new();
    for (kind, text) in declared {
        if let Some(spec) = decode_service(role, &kind, text)? {
            services.insert(kind, spec);
        }
    }
    services.extend(decode_custom_services(role, &raw.custom_service)?);

    Ok(ClusterCommon {
        role: role.to_string(),
        services,
        image_id: raw.image_id,
        hypervisor: raw.hypervisor,
        health_check: raw.health_check,
        monitor: raw.monitor,
        agent_installed: raw.agent_installed,
        passphraseless: raw.passphraseless,
    })
}

fn convert_node(node_id: &str, raw: RawClusterNode) -> ClusterNode {
    let token = raw
        .custom_metadata
        .as_ref()
        .and_then(|m| m.get("token"))
        .filter(|t| !t.is_empty())
        .cloned();
    ClusterNode {
        node_id: node_id.to_string(),
        role: Role::parse(&raw.role),
        server_id: raw.server_id,
        group_id: raw.group_id,
        instance_id: raw.instance_id,
        volume_id: raw.volume_id,
        device: raw.device,
        private_ip: raw.private_ip,
        subnet_id: raw.subnet_id,
        status: raw.status,
        transition_status: raw.transition_status,
        pub_key: raw.pub_key,
        token,
    }
}
