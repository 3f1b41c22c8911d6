// src/model/task.rs

//! Tasks and their directive payloads.
//!
//! A task's directive is stored as an opaque JSON value so the plan can be
//! serialized and handed to any executor. Handlers decode it into the typed
//! directive for their action, and write it back once they learn runtime
//! facts (instance ids, volume ids, private addresses).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{PitrixError, Result};
use crate::types::{TaskAction, Target};

/// One primitive unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub job_id: String,
    pub owner: String,
    pub task_action: TaskAction,
    pub target: Target,
    pub node_id: String,
    #[serde(default)]
    pub directive: Value,
    #[serde(default)]
    pub failure_allowed: bool,
    /// Seconds.
    #[serde(default)]
    pub timeout: u64,
}

impl Task {
    /// True when there is nothing for a handler to act on.
    pub fn directive_is_empty(&self) -> bool {
        match &self.directive {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn decode_directive<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.directive.clone()).map_err(|e| {
            PitrixError::InvalidDirective {
                action: self.task_action,
                reason: e.to_string(),
            }
        })
    }

    /// Replace the directive with an updated payload.
    pub fn write_directive<T: Serialize>(&mut self, directive: &T) -> Result<()> {
        self.directive = serde_json::to_value(directive)?;
        Ok(())
    }
}

/// Directive of instance tasks (run/start/stop/delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InstanceDirective {
    pub runtime_id: String,
    pub name: String,
    pub node_id: String,
    pub role: String,
    pub image_id: String,
    pub cpu: u32,
    pub memory: u32,
    pub gpu: u32,
    pub instance_class: i32,
    pub instance_size: i64,
    pub subnet: String,
    pub zone: String,
    pub hostname: String,
    pub instance_id: String,
    pub volume_id: String,
    pub private_ip: String,
    pub device: String,
    pub timeout: u64,
}

/// Directive of volume tasks (create/attach/detach/delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VolumeDirective {
    pub runtime_id: String,
    pub name: String,
    pub node_id: String,
    pub size: i64,
    pub zone: String,
    pub volume_id: String,
    pub instance_id: String,
    pub mount_point: String,
    pub timeout: u64,
}

/// Command registered for a drone to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CmdSpec {
    pub id: String,
    pub cmd: String,
    pub timeout: u64,
}

/// How a volume is formatted and mounted on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MountSpec {
    pub mount_point: String,
    pub file_system: String,
    pub mount_options: String,
    pub device: String,
}

/// Directive of pilot-targeted tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PilotDirective {
    pub cluster_id: String,
    pub frontgate_id: String,
    pub node_id: String,
    pub instance_id: String,
    pub drone_ip: String,
    pub timeout: u64,
    pub cmd: Option<CmdSpec>,
    pub cnodes: Option<Value>,
    pub config: Option<Value>,
    pub volume: Option<MountSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FrontgateWaitDirective {
    pub cluster_id: String,
    pub frontgate_id: String,
    pub timeout: u64,
}

/// Directive of Kubernetes release tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReleaseDirective {
    pub runtime_id: String,
    pub cluster_id: String,
    pub namespace: String,
    pub release_name: String,
    pub values: Value,
    pub timeout: u64,
}
