// src/provider/mod.rs

//! Provider-targeted task execution.
//!
//! - [`ProviderHandler`] is the capability every infrastructure provider
//!   exposes: one mutating call and one wait per task action.
//! - [`Handlers`] maps the closed [`Provider`] enum to registered handlers.
//! - [`iaas`] implements the handler contract for VM clouds over a
//!   [`iaas::CloudApi`] boundary; [`helm`] does the same for Kubernetes
//!   releases over a [`helm::ReleaseApi`] boundary.
//! - [`wait`] holds the bounded polling used by every wait.

pub mod helm;
pub mod iaas;
pub mod wait;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::errors::{PitrixError, Result};
use crate::model::Task;
use crate::types::{Provider, TaskAction};

pub use helm::{HelmHandler, ReleaseApi, ReleaseStatus};
pub use iaas::{
    CloudApi, FrontgateStatus, IaasHandler, InstanceInfo, InstanceStatus, VolumeInfo,
    VolumeStatus,
};
pub use wait::{PollStatus, StopSignal, Waiter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SubnetInfo {
    pub subnet_id: String,
    pub vpc_id: String,
    pub zone: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VpcInfo {
    pub vpc_id: String,
    pub name: String,
    pub subnets: Vec<String>,
    pub eip: Option<String>,
}

/// Infrastructure operations of one provider.
///
/// Every method receives the task being executed and may write facts it
/// learns (instance ids, addresses, devices) back into the task directive.
pub trait ProviderHandler: Send + Sync {
    fn provider(&self) -> Provider;

    fn run_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn wait_run_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn stop_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn wait_stop_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn start_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn wait_start_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn delete_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn wait_delete_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;

    fn create_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn wait_create_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn attach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn wait_attach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn detach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn wait_detach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn delete_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;
    fn wait_delete_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;

    fn wait_frontgate_available<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a>;

    fn describe_subnet<'a>(
        &'a self,
        runtime_id: &'a str,
        subnet_id: &'a str,
    ) -> BoxFuture<'a, SubnetInfo>;

    fn describe_vpc<'a>(&'a self, runtime_id: &'a str, vpc_id: &'a str) -> BoxFuture<'a, VpcInfo>;

    /// Run the mutating half of a task.
    fn handle_subtask<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        let action = task.task_action;
        match action {
            TaskAction::RunInstances => self.run_instances(task),
            TaskAction::StopInstances => self.stop_instances(task),
            TaskAction::StartInstances => self.start_instances(task),
            TaskAction::DeleteInstances => self.delete_instances(task),
            TaskAction::CreateVolumes => self.create_volumes(task),
            TaskAction::AttachVolumes => self.attach_volumes(task),
            TaskAction::DetachVolumes => self.detach_volumes(task),
            TaskAction::DeleteVolumes => self.delete_volumes(task),
            // Nothing to start; the wait does all the work.
            TaskAction::WaitFrontgateAvailable => Box::pin(async { Ok(()) }),
            other => unsupported(self.provider(), other),
        }
    }

    /// Block until the effect of `handle_subtask` is observable.
    fn wait_subtask<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        let action = task.task_action;
        match action {
            TaskAction::RunInstances => self.wait_run_instances(task),
            TaskAction::StopInstances => self.wait_stop_instances(task),
            TaskAction::StartInstances => self.wait_start_instances(task),
            TaskAction::DeleteInstances => self.wait_delete_instances(task),
            TaskAction::CreateVolumes => self.wait_create_volumes(task),
            TaskAction::AttachVolumes => self.wait_attach_volumes(task),
            TaskAction::DetachVolumes => self.wait_detach_volumes(task),
            TaskAction::DeleteVolumes => self.wait_delete_volumes(task),
            TaskAction::WaitFrontgateAvailable => self.wait_frontgate_available(task),
            other => unsupported(self.provider(), other),
        }
    }
}

fn unsupported<'a>(provider: Provider, action: TaskAction) -> BoxFuture<'a> {
    Box::pin(async move {
        Err(PitrixError::UnsupportedAction(format!(
            "{action} is not a {provider} provider action"
        )))
    })
}

/// Registered provider handlers.
#[derive(Clone, Default)]
pub struct Handlers {
    aws: Option<Arc<dyn ProviderHandler>>,
    aliyun: Option<Arc<dyn ProviderHandler>>,
    qingcloud: Option<Arc<dyn ProviderHandler>>,
    kubernetes: Option<Arc<dyn ProviderHandler>>,
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered: Vec<Provider> = Provider::ALL
            .into_iter()
            .filter(|p| self.slot(*p).is_some())
            .collect();
        f.debug_struct("Handlers")
            .field("registered", &registered)
            .finish()
    }
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under the provider it reports.
    pub fn register(mut self, handler: Arc<dyn ProviderHandler>) -> Self {
        let provider = handler.provider();
        *self.slot_mut(provider) = Some(handler);
        self
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ProviderHandler>> {
        self.slot(provider)
            .clone()
            .ok_or(PitrixError::NoHandler(provider))
    }

    fn slot(&self, provider: Provider) -> &Option<Arc<dyn ProviderHandler>> {
        match provider {
            Provider::Aws => &self.aws,
            Provider::Aliyun => &self.aliyun,
            Provider::QingCloud => &self.qingcloud,
            Provider::Kubernetes => &self.kubernetes,
        }
    }

    fn slot_mut(&mut self, provider: Provider) -> &mut Option<Arc<dyn ProviderHandler>> {
        match provider {
            Provider::Aws => &mut self.aws,
            Provider::Aliyun => &mut self.aliyun,
            Provider::QingCloud => &mut self.qingcloud,
            Provider::Kubernetes => &mut self.kubernetes,
        }
    }
}
