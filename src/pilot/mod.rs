// src/pilot/mod.rs

//! Pilot-targeted task execution.
//!
//! Metadata and command registration land in the [`MetadataStore`] that
//! confd watches. Everything that has to happen on a frontgate or drone
//! (confd control, pings, config pushes, mounts) goes through an
//! [`AgentTransport`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::BoxFuture;
use crate::errors::{PitrixError, Result};
use crate::model::{PilotDirective, Task};
use crate::plan::metadata;
use crate::store::MetadataStore;
use crate::types::TaskAction;

/// Executor for tasks whose target is the pilot.
pub trait PilotHandler: Send + Sync {
    fn handle_subtask<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn wait_subtask<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
}

/// Channel to frontgates and drones.
pub trait AgentTransport: Send + Sync {
    fn call<'a>(&'a self, action: TaskAction, directive: &'a PilotDirective) -> BoxFuture<'a>;

    /// Resolves once the command registered for the directive's node has run.
    fn wait_cmd<'a>(&'a self, directive: &'a PilotDirective) -> BoxFuture<'a>;
}

pub struct MetadataPilot<S> {
    store: S,
    agent: Option<Arc<dyn AgentTransport>>,
}

impl<S> fmt::Debug for MetadataPilot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataPilot")
            .field("agent", &self.agent.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: MetadataStore> MetadataPilot<S> {
    pub fn new(store: S) -> Self {
        Self { store, agent: None }
    }

    pub fn with_agent(mut self, agent: Arc<dyn AgentTransport>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn agent(&self, action: TaskAction) -> Result<&dyn AgentTransport> {
        self.agent.as_deref().ok_or_else(|| {
            PitrixError::UnsupportedAction(format!("{action} needs an agent transport"))
        })
    }

    async fn put_tree(&self, tree: &serde_json::Value) -> Result<usize> {
        let pairs = metadata::flatten(tree);
        for (key, value) in &pairs {
            self.store.put(key, value).await?;
        }
        Ok(pairs.len())
    }

    async fn register_cnodes(&self, task: &Task, d: &PilotDirective) -> Result<()> {
        let Some(tree) = &d.cnodes else {
            debug!(node_id = %task.node_id, action = %task.task_action, "no metadata to register");
            return Ok(());
        };
        let keys = self.put_tree(tree).await?;
        info!(
            job_id = %task.job_id,
            cluster_id = %d.cluster_id,
            action = %task.task_action,
            keys,
            "metadata registered"
        );
        Ok(())
    }

    async fn deregister_node(&self, d: &PilotDirective) -> Result<()> {
        let hosts = format!("{}/hosts", metadata::cluster_path(&d.cluster_id));
        let entries = self.store.get_prefix(&hosts).await?;
        let records: Vec<&str> = entries
            .iter()
            .filter(|(k, v)| k.ends_with("/node_id") && **v == d.node_id)
            .filter_map(|(k, _)| k.strip_suffix("/node_id"))
            .collect();
        for record in records {
            let removed = self.store.delete(record).await?;
            debug!(record, removed, "host record removed");
        }
        Ok(())
    }

    fn cmd_key(d: &PilotDirective) -> &str {
        if d.instance_id.is_empty() {
            &d.node_id
        } else {
            &d.instance_id
        }
    }

    async fn handle(&self, task: &Task) -> Result<()> {
        if task.directive_is_empty() {
            debug!(node_id = %task.node_id, action = %task.task_action, "empty directive; nothing to do");
            return Ok(());
        }
        let d: PilotDirective = task.decode_directive()?;

        match task.task_action {
            TaskAction::RegisterMetadata | TaskAction::RegisterNodesMetadata => {
                self.register_cnodes(task, &d).await
            }
            TaskAction::DeregisterMetadata => {
                let removed = self
                    .store
                    .delete(&metadata::cluster_path(&d.cluster_id))
                    .await?;
                info!(cluster_id = %d.cluster_id, removed, "cluster metadata deregistered");
                Ok(())
            }
            TaskAction::DeregisterNodesMetadata => self.deregister_node(&d).await,
            TaskAction::RegisterCmd => {
                let Some(cmd) = &d.cmd else {
                    return Err(PitrixError::InvalidDirective {
                        action: task.task_action,
                        reason: "register cmd without a command".to_string(),
                    });
                };
                let tree = metadata::cmd_cnodes(&d.cluster_id, Self::cmd_key(&d), cmd);
                self.put_tree(&tree).await?;
                info!(job_id = %task.job_id, node_id = %d.node_id, cmd_id = %cmd.id, "command registered");
                Ok(())
            }
            TaskAction::DeregisterCmd => {
                self.store
                    .delete(&metadata::cmd_path(&d.cluster_id, Self::cmd_key(&d)))
                    .await?;
                Ok(())
            }
            action @ (TaskAction::StartConfd
            | TaskAction::StopConfd
            | TaskAction::PingFrontgate
            | TaskAction::PingMetadataBackend
            | TaskAction::SetFrontgateConfig
            | TaskAction::FormatAndMountVolume
            | TaskAction::UmountVolume
            | TaskAction::RemoveContainerOnFrontgate) => {
                debug!(node_id = %d.node_id, %action, "forwarding to agent");
                self.agent(action)?.call(action, &d).await
            }
            other => Err(PitrixError::UnsupportedAction(format!(
                "{other} is not a pilot action"
            ))),
        }
    }

    async fn wait(&self, task: &Task) -> Result<()> {
        if task.task_action != TaskAction::RegisterCmd || task.directive_is_empty() {
            return Ok(());
        }
        let d: PilotDirective = task.decode_directive()?;
        match &self.agent {
            Some(agent) => agent.wait_cmd(&d).await,
            None => {
                debug!(node_id = %d.node_id, "no agent transport; command left to confd");
                Ok(())
            }
        }
    }
}

impl<S: MetadataStore> PilotHandler for MetadataPilot<S> {
    fn handle_subtask<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.handle(task).await })
    }

    fn wait_subtask<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.wait(task).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CmdSpec;
    use crate::store::MemoryStore;
    use crate::types::Target;
    use serde_json::json;

    fn task(action: TaskAction, directive: &PilotDirective) -> Task {
        Task {
            job_id: "j-1".to_string(),
            owner: "usr-1".to_string(),
            task_action: action,
            target: Target::Pilot,
            node_id: directive.node_id.clone(),
            directive: serde_json::to_value(directive).unwrap(),
            failure_allowed: false,
            timeout: 0,
        }
    }

    #[tokio::test]
    async fn register_and_deregister_cluster_metadata() {
        let pilot = MetadataPilot::new(MemoryStore::new());
        let d = PilotDirective {
            cluster_id: "cl-1".to_string(),
            cnodes: Some(json!({
                "clusters": { "cl-1": {
                    "hosts": { "master": { "i-1": { "node_id": "cln-1", "ip": "10.0.0.1" } } },
                    "cluster": { "app_id": "app-1" }
                }}
            })),
            ..Default::default()
        };
        let mut t = task(TaskAction::RegisterMetadata, &d);
        pilot.handle_subtask(&mut t).await.unwrap();
        let store = pilot.store().snapshot();
        assert_eq!(store["/clusters/cl-1/hosts/master/i-1/ip"], "10.0.0.1");

        let node = PilotDirective {
            cluster_id: "cl-1".to_string(),
            node_id: "cln-1".to_string(),
            ..Default::default()
        };
        let mut t = task(TaskAction::DeregisterNodesMetadata, &node);
        pilot.handle_subtask(&mut t).await.unwrap();
        let store = pilot.store().snapshot();
        assert!(store.keys().all(|k| !k.contains("/hosts/")));
        assert_eq!(store["/clusters/cl-1/cluster/app_id"], "app-1");

        let mut t = task(TaskAction::DeregisterMetadata, &node);
        pilot.handle_subtask(&mut t).await.unwrap();
        assert!(pilot.store().snapshot().is_empty());
    }

    #[tokio::test]
    async fn cmd_registration_round_trip() {
        let pilot = MetadataPilot::new(MemoryStore::new());
        let d = PilotDirective {
            cluster_id: "cl-1".to_string(),
            node_id: "cln-1".to_string(),
            instance_id: "i-1".to_string(),
            cmd: Some(CmdSpec {
                id: "j-1/StartService/cln-1".to_string(),
                cmd: "start.sh".to_string(),
                timeout: 60,
            }),
            ..Default::default()
        };
        let mut t = task(TaskAction::RegisterCmd, &d);
        pilot.handle_subtask(&mut t).await.unwrap();
        pilot.wait_subtask(&mut t).await.unwrap();
        assert_eq!(
            pilot.store().snapshot()["/clusters/cl-1/cmd/i-1/cmd"],
            "start.sh"
        );

        let mut t = task(TaskAction::DeregisterCmd, &d);
        pilot.handle_subtask(&mut t).await.unwrap();
        assert!(pilot.store().snapshot().is_empty());
    }

    #[tokio::test]
    async fn drone_actions_need_an_agent() {
        let pilot = MetadataPilot::new(MemoryStore::new());
        let d = PilotDirective {
            cluster_id: "cl-1".to_string(),
            node_id: "cln-1".to_string(),
            ..Default::default()
        };
        let mut t = task(TaskAction::StartConfd, &d);
        let err = pilot.handle_subtask(&mut t).await.unwrap_err();
        assert!(matches!(err, PitrixError::UnsupportedAction(_)));
    }
}
