// src/plan/metadata.rs

//! Metadata trees registered for confd.
//!
//! Everything here is a pure function of a [`ClusterWrapper`]. The resulting
//! tree has the layout
//!
//! ```text
//! { "clusters": { <cluster_id>: { "hosts": {..}, "cluster": {..}, "env": {..}? } } }
//! ```
//!
//! and is flattened into `/clusters/<id>/...` keys by the pilot before it
//! reaches the metadata store.

use serde_json::{Map, Value, json};

use crate::errors::Result;
use crate::model::{ClusterNode, ClusterWrapper, CmdSpec};

/// Full metadata tree for the cluster.
pub fn compose(wrapper: &ClusterWrapper) -> Result<Value> {
    let nodes: Vec<&ClusterNode> = wrapper.nodes.values().collect();
    let mut body = Map::new();
    body.insert("hosts".to_string(), hosts(wrapper, &nodes)?);
    body.insert("cluster".to_string(), cluster_facts(wrapper));
    let env = env(wrapper);
    if !env.is_empty() {
        body.insert("env".to_string(), Value::Object(env));
    }
    Ok(wrap_cluster(&wrapper.cluster.cluster_id, body))
}

/// Tree holding only the host records of the given nodes.
pub fn compose_nodes(wrapper: &ClusterWrapper, node_ids: &[String]) -> Result<Value> {
    let nodes = node_ids
        .iter()
        .map(|id| wrapper.node(id))
        .collect::<Result<Vec<_>>>()?;
    let mut body = Map::new();
    body.insert("hosts".to_string(), hosts(wrapper, &nodes)?);
    Ok(wrap_cluster(&wrapper.cluster.cluster_id, body))
}

/// Tree registering a single command for a node.
pub fn cmd_cnodes(cluster_id: &str, instance_id: &str, cmd: &CmdSpec) -> Value {
    json!({
        "clusters": {
            cluster_id: {
                "cmd": {
                    instance_id: {
                        "id": cmd.id,
                        "cmd": cmd.cmd,
                        "timeout": cmd.timeout,
                    }
                }
            }
        }
    })
}

/// Store prefix of the whole cluster.
pub fn cluster_path(cluster_id: &str) -> String {
    format!("/clusters/{cluster_id}")
}

/// Store prefix of one command registration.
pub fn cmd_path(cluster_id: &str, instance_id: &str) -> String {
    format!("/clusters/{cluster_id}/cmd/{instance_id}")
}


/// Re-key host records by instance id and refresh their addresses.
///
/// `lookup` maps a node id to the `(instance_id, private_ip)` learned while
/// the plan ran; empty values leave the record untouched.
pub fn refresh_hosts<F>(tree: &mut Value, mut lookup: F)
where
    F: FnMut(&str) -> Option<(String, String)>,
{
    let Some(clusters) = tree.get_mut("clusters").and_then(Value::as_object_mut) else {
        return;
    };
    for cluster in clusters.values_mut() {
        if let Some(hosts) = cluster.get_mut("hosts").and_then(Value::as_object_mut) {
            refresh_records(hosts, &mut lookup);
        }
    }
}

fn refresh_records<F>(records: &mut Map<String, Value>, lookup: &mut F)
where
    F: FnMut(&str) -> Option<(String, String)>,
{
    let old = std::mem::take(records);
    for (mut key, mut value) in old {
        let node_id = value
            .get("node_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        match node_id {
            Some(node_id) => {
                if let Some((instance_id, ip)) = lookup(&node_id) {
                    if !instance_id.is_empty() {
                        value["instance_id"] = json!(instance_id);
                        key = instance_id;
                    }
                    if !ip.is_empty() {
                        value["ip"] = json!(ip);
                    }
                }
            }
            // Role level: recurse into its records.
            None => {
                if let Value::Object(inner) = &mut value {
                    refresh_records(inner, lookup);
                }
            }
        }
        records.insert(key, value);
    }
}

/// Render a tree into `(path, value)` pairs, depth first, in key order.
pub fn flatten(tree: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into(String::new(), tree, &mut out);
    out
}

fn flatten_into(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(format!("{prefix}/{key}"), child, out);
            }
        }
        Value::String(s) => out.push((prefix, s.clone())),
        Value::Null => out.push((prefix, String::new())),
        other => out.push((prefix, other.to_string())),
    }
}

fn wrap_cluster(cluster_id: &str, body: Map<String, Value>) -> Value {
    let mut clusters = Map::new();
    clusters.insert(cluster_id.to_string(), Value::Object(body));
    json!({ "clusters": clusters })
}

/// Hosts are keyed by instance id; nodes that have no instance yet fall back
/// to their node id until the driver recomposes the tree.
fn host_key(node: &ClusterNode) -> &str {
    if node.instance_id.is_empty() {
        &node.node_id
    } else {
        &node.instance_id
    }
}

fn hosts(wrapper: &ClusterWrapper, nodes: &[&ClusterNode]) -> Result<Value> {
    let mut hosts = Map::new();
    for node in nodes {
        let record = host_record(wrapper, node)?;
        let key = host_key(node).to_string();
        let role = node.role.to_string();
        if role.is_empty() {
            hosts.insert(key, record);
        } else {
            let entry = hosts
                .entry(role)
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(by_instance) = entry {
                by_instance.insert(key, record);
            }
        }
    }
    Ok(Value::Object(hosts))
}

fn host_record(wrapper: &ClusterWrapper, node: &ClusterNode) -> Result<Value> {
    let role = wrapper.role_of(node)?;
    let common = wrapper.common_of(node)?;

    let mut record = Map::new();
    record.insert("ip".to_string(), json!(node.private_ip));
    record.insert("server_id".to_string(), json!(node.server_id));
    record.insert("group_id".to_string(), json!(node.group_id));
    record.insert(
        "global_server_id".to_string(),
        json!(global_server_id(&wrapper.cluster.global_uuid, node.server_id)),
    );
    record.insert("node_id".to_string(), json!(node.node_id));
    record.insert("instance_id".to_string(), json!(node.instance_id));
    record.insert("cpu".to_string(), json!(role.cpu));
    record.insert("gpu".to_string(), json!(role.gpu));
    record.insert("memory".to_string(), json!(role.memory));
    record.insert("volume_size".to_string(), json!(role.storage_size));
    record.insert("instance_size".to_string(), json!(role.instance_size));
    if !common.passphraseless.is_empty() {
        record.insert("pub_key".to_string(), json!(node.pub_key));
    }
    if let Some(token) = &node.token {
        record.insert("token".to_string(), json!(token));
    }
    Ok(Value::Object(record))
}

fn global_server_id(global_uuid: &str, server_id: u32) -> String {
    format!("{global_uuid}{server_id}")
}

fn cluster_facts(wrapper: &ClusterWrapper) -> Value {
    let cluster = &wrapper.cluster;
    json!({
        "cluster_id": cluster.cluster_id,
        "app_id": cluster.app_id,
        "subnet": cluster.subnet_id,
        "owner": cluster.owner,
        "runtime_id": cluster.runtime_id,
        "global_uuid": cluster.global_uuid,
    })
}

fn env(wrapper: &ClusterWrapper) -> Map<String, Value> {
    let mut env = Map::new();
    for (name, role) in &wrapper.roles {
        if role.env.is_empty() {
            continue;
        }
        if name.is_empty() {
            env.extend(role.env.clone());
        } else {
            env.insert(name.clone(), Value::Object(role.env.clone()));
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawClusterCommon, RawClusterNode, RawClusterRole, RawClusterWrapper};
    use std::collections::BTreeMap;

    fn wrapper(role: &str, passphraseless: &str, token: Option<&str>) -> ClusterWrapper {
        let mut raw = RawClusterWrapper::default();
        raw.cluster.cluster_id = "cl-1".to_string();
        raw.cluster.app_id = "app-1".to_string();
        raw.cluster.global_uuid = "7".to_string();
        raw.cluster_roles.insert(
            role.to_string(),
            RawClusterRole {
                cpu: 1,
                memory: 1024,
                storage_size: 10,
                env: r#"{"port":8080}"#.to_string(),
                ..Default::default()
            },
        );
        raw.cluster_commons.insert(
            role.to_string(),
            RawClusterCommon {
                passphraseless: passphraseless.to_string(),
                ..Default::default()
            },
        );
        raw.cluster_nodes.insert(
            "cln-1".to_string(),
            RawClusterNode {
                role: role.to_string(),
                server_id: 3,
                instance_id: "i-1".to_string(),
                private_ip: "10.0.0.3".to_string(),
                pub_key: "ssh-rsa AAA".to_string(),
                custom_metadata: token.map(|t| {
                    BTreeMap::from([("token".to_string(), t.to_string())])
                }),
                ..Default::default()
            },
        );
        ClusterWrapper::try_from(raw).unwrap()
    }

    #[test]
    fn named_role_nests_hosts_by_role() {
        let tree = compose(&wrapper("master", "", None)).unwrap();
        let host = &tree["clusters"]["cl-1"]["hosts"]["master"]["i-1"];
        assert_eq!(host["ip"], "10.0.0.3");
        assert_eq!(host["server_id"], 3);
        assert_eq!(host["global_server_id"], "73");
        assert!(host.get("pub_key").is_none());
        assert!(host.get("token").is_none());
        assert_eq!(tree["clusters"]["cl-1"]["env"]["master"]["port"], 8080);
    }

    #[test]
    fn empty_role_skips_nesting() {
        let tree = compose(&wrapper("", "ssh-rsa", Some("tok"))).unwrap();
        let host = &tree["clusters"]["cl-1"]["hosts"]["i-1"];
        assert_eq!(host["pub_key"], "ssh-rsa AAA");
        assert_eq!(host["token"], "tok");
        assert_eq!(tree["clusters"]["cl-1"]["env"]["port"], 8080);
    }

    #[test]
    fn refresh_rekeys_hosts_by_instance() {
        let mut w = wrapper("master", "", None);
        let node = w.nodes.get_mut("cln-1").unwrap();
        node.instance_id.clear();
        node.private_ip.clear();
        let mut tree = compose(&w).unwrap();
        assert!(tree["clusters"]["cl-1"]["hosts"]["master"]["cln-1"].is_object());

        refresh_hosts(&mut tree, |node_id| {
            (node_id == "cln-1").then(|| ("i-9".to_string(), "10.0.0.9".to_string()))
        });
        let hosts = &tree["clusters"]["cl-1"]["hosts"]["master"];
        assert!(hosts.get("cln-1").is_none());
        assert_eq!(hosts["i-9"]["instance_id"], "i-9");
        assert_eq!(hosts["i-9"]["ip"], "10.0.0.9");
    }

    #[test]
    fn flatten_renders_store_paths() {
        let cmd = CmdSpec {
            id: "j-1".to_string(),
            cmd: "start.sh".to_string(),
            timeout: 30,
        };
        let pairs = flatten(&cmd_cnodes("cl-1", "i-1", &cmd));
        assert_eq!(
            pairs,
            vec![
                ("/clusters/cl-1/cmd/i-1/cmd".to_string(), "start.sh".to_string()),
                ("/clusters/cl-1/cmd/i-1/id".to_string(), "j-1".to_string()),
                ("/clusters/cl-1/cmd/i-1/timeout".to_string(), "30".to_string()),
            ]
        );
    }
}
