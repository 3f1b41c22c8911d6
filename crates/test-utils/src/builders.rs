#![allow(dead_code)]

use std::time::Duration;

use pitrix::config::{DefaultsSection, PlanConfig, RawPlanConfig};
use pitrix::model::{
    ClusterWrapper, Credential, Job, RawClusterCommon, RawClusterNode, RawClusterRole,
    RawClusterWrapper, RuntimeDetails,
};
use pitrix::types::{ClusterType, JobAction, Provider, STATUS_ACTIVE};
use serde_json::json;

/// JSON service descriptor as carried in a cluster common.
pub fn service(cmd: &str, order: i32) -> String {
    json!({ "cmd": cmd, "order": order }).to_string()
}

/// Service descriptor capped to `nodes_to_execute_on` nodes.
pub fn capped_service(cmd: &str, order: i32, nodes_to_execute_on: usize) -> String {
    json!({ "cmd": cmd, "order": order, "nodes_to_execute_on": nodes_to_execute_on })
        .to_string()
}

/// Init descriptor that runs after the start service.
pub fn post_start_service(cmd: &str, order: i32) -> String {
    json!({ "cmd": cmd, "order": order, "post_start_service": true }).to_string()
}

/// Builder for cluster documents.
pub struct ClusterBuilder {
    raw: RawClusterWrapper,
}

impl ClusterBuilder {
    pub fn new(cluster_id: &str) -> Self {
        let mut raw = RawClusterWrapper::default();
        raw.cluster.cluster_id = cluster_id.to_string();
        raw.cluster.app_id = "app-1".to_string();
        raw.cluster.version_id = "appv-1".to_string();
        raw.cluster.owner = "usr-1".to_string();
        raw.cluster.runtime_id = "rt-1".to_string();
        raw.cluster.subnet_id = "vxnet-1".to_string();
        raw.cluster.vpc_id = "rtr-1".to_string();
        raw.cluster.frontgate_id = "cl-fg-1".to_string();
        raw.cluster.status = STATUS_ACTIVE.to_string();
        raw.cluster.global_uuid = "1000".to_string();
        Self { raw }
    }

    /// Turn the document into a frontgate cluster.
    pub fn frontgate(mut self) -> Self {
        self.raw.cluster.cluster_type = ClusterType::Frontgate;
        self.raw.cluster.frontgate_id.clear();
        self
    }

    /// Application cluster not fronted by any frontgate.
    pub fn without_frontgate(mut self) -> Self {
        self.raw.cluster.frontgate_id.clear();
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.raw.cluster.status = status.to_string();
        self
    }

    pub fn env(mut self, env: serde_json::Value) -> Self {
        self.raw.cluster.env = env.to_string();
        self
    }

    pub fn role(mut self, name: &str, role: RawClusterRole) -> Self {
        self.raw.cluster_roles.insert(name.to_string(), role);
        self
    }

    pub fn common(mut self, name: &str, common: RawClusterCommon) -> Self {
        self.raw.cluster_commons.insert(name.to_string(), common);
        self
    }

    /// Add a role with storage on one mount point and the given common.
    pub fn storage_role(self, name: &str, common: RawClusterCommon) -> Self {
        self.role(
            name,
            RawClusterRole {
                cpu: 2,
                memory: 4096,
                storage_size: 20,
                mount_point: "/data".to_string(),
                ..Default::default()
            },
        )
        .common(name, common)
    }

    pub fn node(self, node_id: &str, role: &str) -> Self {
        self.node_with(
            node_id,
            RawClusterNode {
                role: role.to_string(),
                ..Default::default()
            },
        )
    }

    pub fn node_with_status(self, node_id: &str, role: &str, status: &str) -> Self {
        self.node_with(
            node_id,
            RawClusterNode {
                role: role.to_string(),
                status: status.to_string(),
                ..Default::default()
            },
        )
    }

    pub fn node_with(mut self, node_id: &str, node: RawClusterNode) -> Self {
        self.raw.cluster_nodes.insert(node_id.to_string(), node);
        self
    }

    pub fn raw(&self) -> &RawClusterWrapper {
        &self.raw
    }

    pub fn directive(&self) -> String {
        serde_json::to_string(&self.raw).expect("cluster document serializes")
    }

    pub fn build(self) -> ClusterWrapper {
        ClusterWrapper::from_raw(self.raw, &DefaultsSection::default())
            .expect("Failed to build valid cluster from builder")
    }

    pub fn job(&self, action: JobAction, provider: Provider) -> Job {
        Job {
            job_id: "j-1".to_string(),
            owner: self.raw.cluster.owner.clone(),
            cluster_id: self.raw.cluster.cluster_id.clone(),
            app_id: self.raw.cluster.app_id.clone(),
            version_id: self.raw.cluster.version_id.clone(),
            job_action: action,
            provider,
            runtime_id: self.raw.cluster.runtime_id.clone(),
            directive: self.directive(),
        }
    }
}

/// Common with an image and the given services.
pub fn common(image: &str) -> RawClusterCommon {
    RawClusterCommon {
        image_id: image.to_string(),
        ..Default::default()
    }
}

pub fn runtime(provider: Provider) -> RuntimeDetails {
    RuntimeDetails {
        runtime_id: "rt-1".to_string(),
        provider,
        zone: "pek3".to_string(),
        url: String::new(),
        credential: Credential("secret".to_string()),
    }
}

/// Planner config with fast waits for tests.
pub fn fast_config() -> PlanConfig {
    let mut raw = RawPlanConfig::default();
    raw.wait.interval = "5ms".to_string();
    raw.wait.timeout = "2s".to_string();
    PlanConfig::try_from(raw).expect("valid test config")
}

/// Wait timeout of [`fast_config`].
pub const FAST_TIMEOUT: Duration = Duration::from_secs(2);

/// Three roles and five nodes, modelled on an HBase deployment:
///
/// - `master` (1 node): init at order 0, start at order 0.
/// - `namenode` (1 node): start at order 1.
/// - `slave` (3 nodes, all `slave-replica`): start at order 2.
///
/// Every role requests storage on one mount point.
pub fn hbase_like() -> ClusterBuilder {
    let mut master = common("img-hbase");
    master.init_service = service("init-master.sh", 0);
    master.start_service = service("start-master.sh", 0);
    master.stop_service = service("stop-master.sh", 0);
    master.destroy_service = service("destroy-master.sh", 0);

    let mut namenode = common("img-hbase");
    namenode.start_service = service("start-namenode.sh", 1);
    namenode.stop_service = service("stop-namenode.sh", 1);

    let mut slave = common("img-hbase");
    slave.start_service = service("start-slave.sh", 2);
    slave.scale_out_service = service("scale-out.sh", 0);
    slave.scale_in_service = service("scale-in.sh", 0);

    ClusterBuilder::new("cl-hbase")
        .env(json!({ "heap": "2g" }))
        .storage_role("master", master)
        .storage_role("namenode", namenode)
        .storage_role("slave", slave)
        .node("cln-m1", "master")
        .node("cln-n1", "namenode")
        .node("cln-s1", "slave-replica")
        .node("cln-s2", "slave-replica")
        .node("cln-s3", "slave-replica")
}
