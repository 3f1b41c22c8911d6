// src/engine/facts.rs

//! Facts learned about nodes while a plan runs.
//!
//! Plans are built before any instance or volume exists, so their directives
//! carry empty ids. Handlers write the ids they learn back into the task; the
//! driver absorbs them here and fills them into later tasks of the same node
//! before dispatch.

use std::collections::BTreeMap;

use tracing::debug;

use crate::model::{InstanceDirective, PilotDirective, Task, VolumeDirective};
use crate::plan::metadata;
use crate::types::{TaskAction, Target};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFacts {
    pub instance_id: String,
    pub private_ip: String,
    pub device: String,
    pub volume_ids: Vec<String>,
}

impl NodeFacts {
    /// Volume ids joined the way volume directives carry them.
    pub fn joined_volume_ids(&self) -> String {
        self.volume_ids.join(",")
    }
}

fn set_if_empty(slot: &mut String, value: &str) {
    if slot.is_empty() && !value.is_empty() {
        *slot = value.to_string();
    }
}

fn set_if_present(slot: &mut String, value: &str) {
    if !value.is_empty() {
        *slot = value.to_string();
    }
}

/// Facts of every node touched by the plan, keyed by node id.
#[derive(Debug, Clone, Default)]
pub struct FactBook {
    nodes: BTreeMap<String, NodeFacts>,
}

impl FactBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeFacts> {
        self.nodes.get(node_id)
    }

    /// Record what a successful task wrote back.
    pub fn absorb(&mut self, task: &Task) {
        if !is_vm_provider_task(task) || task.directive_is_empty() {
            return;
        }
        match task.task_action {
            TaskAction::RunInstances | TaskAction::StartInstances => {
                let Ok(d) = task.decode_directive::<InstanceDirective>() else {
                    return;
                };
                let facts = self.nodes.entry(task.node_id.clone()).or_default();
                set_if_present(&mut facts.instance_id, &d.instance_id);
                set_if_present(&mut facts.private_ip, &d.private_ip);
                set_if_present(&mut facts.device, &d.device);
            }
            TaskAction::CreateVolumes => {
                let Ok(d) = task.decode_directive::<VolumeDirective>() else {
                    return;
                };
                let facts = self.nodes.entry(task.node_id.clone()).or_default();
                for id in d.volume_id.split(',').map(str::trim) {
                    if !id.is_empty() && !facts.volume_ids.iter().any(|v| v == id) {
                        facts.volume_ids.push(id.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    /// Fill ids learned earlier into a task about to be dispatched.
    pub fn fill(&self, task: &mut Task) {
        if task.directive_is_empty() {
            return;
        }
        let filled = match task.target {
            Target::Pilot => self.fill_pilot(task),
            Target::Provider(p) if p.is_vm_based() => self.fill_provider(task),
            Target::Provider(_) => Ok(()),
        };
        if let Err(err) = filled {
            debug!(
                node_id = %task.node_id,
                action = %task.task_action,
                error = %err,
                "directive left as planned"
            );
        }
    }

    fn fill_provider(&self, task: &mut Task) -> crate::errors::Result<()> {
        let Some(facts) = self.nodes.get(&task.node_id) else {
            return Ok(());
        };
        match task.task_action {
            TaskAction::RunInstances
            | TaskAction::StartInstances
            | TaskAction::StopInstances
            | TaskAction::DeleteInstances => {
                let mut d: InstanceDirective = task.decode_directive()?;
                set_if_empty(&mut d.instance_id, &facts.instance_id);
                set_if_empty(&mut d.private_ip, &facts.private_ip);
                set_if_empty(&mut d.device, &facts.device);
                set_if_empty(&mut d.volume_id, &facts.joined_volume_ids());
                task.write_directive(&d)
            }
            TaskAction::AttachVolumes | TaskAction::DetachVolumes | TaskAction::DeleteVolumes => {
                let mut d: VolumeDirective = task.decode_directive()?;
                set_if_empty(&mut d.volume_id, &facts.joined_volume_ids());
                set_if_empty(&mut d.instance_id, &facts.instance_id);
                task.write_directive(&d)
            }
            _ => Ok(()),
        }
    }

    fn fill_pilot(&self, task: &mut Task) -> crate::errors::Result<()> {
        let mut d: PilotDirective = task.decode_directive()?;
        if let Some(facts) = self.nodes.get(&task.node_id) {
            set_if_empty(&mut d.instance_id, &facts.instance_id);
            set_if_empty(&mut d.drone_ip, &facts.private_ip);
            if let Some(volume) = d.volume.as_mut() {
                set_if_empty(&mut volume.device, &facts.device);
            }
        }
        if let Some(tree) = d.cnodes.as_mut() {
            metadata::refresh_hosts(tree, |node_id| {
                self.nodes
                    .get(node_id)
                    .map(|f| (f.instance_id.clone(), f.private_ip.clone()))
            });
        }
        task.write_directive(&d)
    }
}

fn is_vm_provider_task(task: &Task) -> bool {
    matches!(task.target, Target::Provider(p) if p.is_vm_based())
}
