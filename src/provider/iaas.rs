// src/provider/iaas.rs

//! Handler contract for VM clouds (AWS, Aliyun, QingCloud).
//!
//! The cloud SDK sits behind [`CloudApi`]; [`IaasHandler`] holds everything
//! the providers share:
//!
//! - an empty directive is a logged no-op;
//! - a teardown task without an id is a logged no-op;
//! - a resource already in the target state is not touched again;
//! - waits poll the describe call through a [`Waiter`];
//! - ids, addresses and devices are written back into the task directive.
//!
//! A node with several volumes carries their ids comma-joined.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::BoxFuture;
use crate::errors::{PitrixError, Result};
use crate::model::{FrontgateWaitDirective, InstanceDirective, Task, VolumeDirective};
use crate::provider::wait::{PollStatus, Waiter};
use crate::provider::{ProviderHandler, SubnetInfo, VpcInfo};
use crate::types::Provider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    Pending,
    Running,
    Stopping,
    Stopped,
    Terminated,
    /// Terminal provider failure with its raw status.
    Failed(String),
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Pending => f.write_str("pending"),
            InstanceStatus::Running => f.write_str("running"),
            InstanceStatus::Stopping => f.write_str("stopping"),
            InstanceStatus::Stopped => f.write_str("stopped"),
            InstanceStatus::Terminated => f.write_str("terminated"),
            InstanceStatus::Failed(raw) => write!(f, "failed ({raw})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeStatus {
    Creating,
    Available,
    InUse,
    Deleted,
    Failed(String),
}

impl fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeStatus::Creating => f.write_str("creating"),
            VolumeStatus::Available => f.write_str("available"),
            VolumeStatus::InUse => f.write_str("in-use"),
            VolumeStatus::Deleted => f.write_str("deleted"),
            VolumeStatus::Failed(raw) => write!(f, "failed ({raw})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontgateStatus {
    Pending,
    /// Active with no transition in flight.
    Active,
    /// Active, but an update or resize has not settled yet.
    Updating,
    Stopped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub instance_id: String,
    pub status: InstanceStatus,
    pub private_ip: String,
    /// Device of the attached data volume, if any.
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub volume_id: String,
    pub status: VolumeStatus,
    pub instance_id: String,
    pub device: String,
}

/// Boundary to one cloud's SDK. `describe_*` return `None` for unknown ids.
pub trait CloudApi: Send + Sync {
    fn provider(&self) -> Provider;

    fn describe_instance<'a>(&'a self, instance_id: &'a str)
    -> BoxFuture<'a, Option<InstanceInfo>>;
    /// Launch an instance (attaching `volume_id` when set); returns its id.
    fn run_instance<'a>(&'a self, request: &'a InstanceDirective) -> BoxFuture<'a, String>;
    fn start_instance<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a>;
    fn stop_instance<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a>;
    fn terminate_instance<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a>;

    fn describe_volume<'a>(&'a self, volume_id: &'a str) -> BoxFuture<'a, Option<VolumeInfo>>;
    /// Create a volume; returns its id.
    fn create_volume<'a>(&'a self, request: &'a VolumeDirective) -> BoxFuture<'a, String>;
    fn attach_volume<'a>(&'a self, volume_id: &'a str, instance_id: &'a str) -> BoxFuture<'a>;
    fn detach_volume<'a>(&'a self, volume_id: &'a str, instance_id: &'a str) -> BoxFuture<'a>;
    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> BoxFuture<'a>;

    fn describe_subnet<'a>(&'a self, subnet_id: &'a str) -> BoxFuture<'a, SubnetInfo>;
    fn describe_vpc<'a>(&'a self, vpc_id: &'a str) -> BoxFuture<'a, VpcInfo>;
    fn describe_frontgate<'a>(
        &'a self,
        frontgate_id: &'a str,
    ) -> BoxFuture<'a, Option<FrontgateStatus>>;
}

fn split_ids(joined: &str) -> Vec<&str> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

pub struct IaasHandler<C> {
    api: Arc<C>,
    waiter: Waiter,
}

impl<C: CloudApi> fmt::Debug for IaasHandler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IaasHandler")
            .field("provider", &self.api.provider())
            .field("waiter", &self.waiter)
            .finish()
    }
}

impl<C: CloudApi> IaasHandler<C> {
    pub fn new(api: Arc<C>, waiter: Waiter) -> Self {
        Self { api, waiter }
    }

    fn instance_directive(&self, task: &Task) -> Result<Option<InstanceDirective>> {
        if task.directive_is_empty() {
            warn!(
                job_id = %task.job_id,
                node_id = %task.node_id,
                action = %task.task_action,
                "empty directive; nothing to do"
            );
            return Ok(None);
        }
        task.decode_directive().map(Some)
    }

    fn volume_directive(&self, task: &Task) -> Result<Option<VolumeDirective>> {
        if task.directive_is_empty() {
            warn!(
                job_id = %task.job_id,
                node_id = %task.node_id,
                action = %task.task_action,
                "empty directive; nothing to do"
            );
            return Ok(None);
        }
        task.decode_directive().map(Some)
    }

    fn missing_id(task: &Task, what: &str) -> PitrixError {
        PitrixError::InvalidDirective {
            action: task.task_action,
            reason: format!("no {what} id to wait for on node {}", task.node_id),
        }
    }

    /// Wait until the instance reaches `target`. A vanished instance counts
    /// as terminated.
    async fn wait_instance(
        &self,
        instance_id: &str,
        timeout: u64,
        target: InstanceStatus,
    ) -> Result<Option<InstanceInfo>> {
        let what = format!("instance {instance_id} to be {target}");
        let api = &*self.api;
        let target = &target;
        self.waiter
            .poll_until(&what, timeout, move || async move {
                let status = match api.describe_instance(instance_id).await? {
                    None if *target == InstanceStatus::Terminated => PollStatus::Ready(None),
                    None => PollStatus::Failed("not found".to_string()),
                    Some(info) if info.status == *target => PollStatus::Ready(Some(info)),
                    Some(info) => match info.status {
                        InstanceStatus::Failed(raw) => PollStatus::Failed(raw),
                        InstanceStatus::Terminated => {
                            PollStatus::Failed(InstanceStatus::Terminated.to_string())
                        }
                        _ => PollStatus::Pending,
                    },
                };
                Ok(status)
            })
            .await
    }

    /// Wait until the volume reaches `target`. A vanished volume counts as
    /// deleted.
    async fn wait_volume(&self, volume_id: &str, timeout: u64, target: VolumeStatus) -> Result<()> {
        let what = format!("volume {volume_id} to be {target}");
        let api = &*self.api;
        let target = &target;
        self.waiter
            .poll_until(&what, timeout, move || async move {
                let status = match api.describe_volume(volume_id).await? {
                    None if *target == VolumeStatus::Deleted => PollStatus::Ready(()),
                    None => PollStatus::Failed("not found".to_string()),
                    Some(info) if info.status == *target => PollStatus::Ready(()),
                    Some(info) => match info.status {
                        VolumeStatus::Failed(raw) => PollStatus::Failed(raw),
                        VolumeStatus::Deleted => {
                            PollStatus::Failed(VolumeStatus::Deleted.to_string())
                        }
                        _ => PollStatus::Pending,
                    },
                };
                Ok(status)
            })
            .await
    }

    /// Shared body of the start and stop calls.
    async fn transition_instance(&self, task: &Task, target: InstanceStatus) -> Result<()> {
        let Some(d) = self.instance_directive(task)? else {
            return Ok(());
        };
        if d.instance_id.is_empty() {
            warn!(node_id = %task.node_id, action = %task.task_action, "no instance id; skipping");
            return Ok(());
        }
        match self.api.describe_instance(&d.instance_id).await? {
            Some(info) if info.status == target => {
                info!(
                    instance_id = %d.instance_id,
                    status = %info.status,
                    "instance already in target state; skipping"
                );
                Ok(())
            }
            None => Err(PitrixError::ResourceFailed {
                what: format!("instance {}", d.instance_id),
                status: "not found".to_string(),
            }),
            Some(_) if target == InstanceStatus::Running => {
                info!(instance_id = %d.instance_id, "starting instance");
                self.api.start_instance(&d.instance_id).await
            }
            Some(_) => {
                info!(instance_id = %d.instance_id, "stopping instance");
                self.api.stop_instance(&d.instance_id).await
            }
        }
    }

    async fn wait_transition(&self, task: &mut Task, target: InstanceStatus) -> Result<()> {
        let Some(mut d) = self.instance_directive(task)? else {
            return Ok(());
        };
        if d.instance_id.is_empty() {
            return Ok(());
        }
        let info = self
            .wait_instance(&d.instance_id, d.timeout, target)
            .await?;
        if let Some(info) = info {
            if !info.private_ip.is_empty() {
                d.private_ip = info.private_ip;
            }
            if !info.device.is_empty() {
                d.device = info.device;
            }
            task.write_directive(&d)?;
        }
        Ok(())
    }
}

impl<C: CloudApi + 'static> ProviderHandler for IaasHandler<C> {
    fn provider(&self) -> Provider {
        self.api.provider()
    }

    fn run_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(mut d) = self.instance_directive(task)? else {
                return Ok(());
            };
            if !d.instance_id.is_empty() {
                if let Some(info) = self.api.describe_instance(&d.instance_id).await? {
                    if info.status != InstanceStatus::Terminated {
                        info!(
                            node_id = %task.node_id,
                            instance_id = %d.instance_id,
                            status = %info.status,
                            "instance already exists; skipping run"
                        );
                        return Ok(());
                    }
                }
            }
            let instance_id = self.api.run_instance(&d).await?;
            info!(
                job_id = %task.job_id,
                node_id = %task.node_id,
                %instance_id,
                "instance launched"
            );
            d.instance_id = instance_id;
            task.write_directive(&d)
        })
    }

    fn wait_run_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            if task.directive_is_empty() {
                return Ok(());
            }
            let d: InstanceDirective = task.decode_directive()?;
            if d.instance_id.is_empty() {
                return Err(Self::missing_id(task, "instance"));
            }
            self.wait_transition(task, InstanceStatus::Running).await
        })
    }

    fn stop_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.transition_instance(task, InstanceStatus::Stopped).await })
    }

    fn wait_stop_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.wait_transition(task, InstanceStatus::Stopped).await })
    }

    fn start_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.transition_instance(task, InstanceStatus::Running).await })
    }

    fn wait_start_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.wait_transition(task, InstanceStatus::Running).await })
    }

    fn delete_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(d) = self.instance_directive(task)? else {
                return Ok(());
            };
            if d.instance_id.is_empty() {
                warn!(node_id = %task.node_id, "no instance id; nothing to delete");
                return Ok(());
            }
            match self.api.describe_instance(&d.instance_id).await? {
                None => {
                    info!(instance_id = %d.instance_id, "instance already gone; skipping");
                    Ok(())
                }
                Some(info) if info.status == InstanceStatus::Terminated => {
                    info!(instance_id = %d.instance_id, "instance already terminated; skipping");
                    Ok(())
                }
                Some(_) => {
                    info!(instance_id = %d.instance_id, "terminating instance");
                    self.api.terminate_instance(&d.instance_id).await
                }
            }
        })
    }

    fn wait_delete_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(d) = self.instance_directive(task)? else {
                return Ok(());
            };
            if d.instance_id.is_empty() {
                return Ok(());
            }
            self.wait_instance(&d.instance_id, d.timeout, InstanceStatus::Terminated)
                .await
                .map(|_| ())
        })
    }

    fn create_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(mut d) = self.volume_directive(task)? else {
                return Ok(());
            };
            if !d.volume_id.is_empty() {
                if let Some(info) = self.api.describe_volume(&d.volume_id).await? {
                    if info.status != VolumeStatus::Deleted {
                        info!(volume_id = %d.volume_id, "volume already exists; skipping create");
                        return Ok(());
                    }
                }
            }
            let volume_id = self.api.create_volume(&d).await?;
            info!(
                job_id = %task.job_id,
                node_id = %task.node_id,
                %volume_id,
                size = d.size,
                "volume created"
            );
            d.volume_id = volume_id;
            task.write_directive(&d)
        })
    }

    fn wait_create_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(d) = self.volume_directive(task)? else {
                return Ok(());
            };
            if d.volume_id.is_empty() {
                return Err(Self::missing_id(task, "volume"));
            }
            for volume_id in split_ids(&d.volume_id) {
                self.wait_volume(volume_id, d.timeout, VolumeStatus::Available)
                    .await?;
            }
            Ok(())
        })
    }

    fn attach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(d) = self.volume_directive(task)? else {
                return Ok(());
            };
            if d.volume_id.is_empty() || d.instance_id.is_empty() {
                warn!(node_id = %task.node_id, "volume or instance id missing; nothing to attach");
                return Ok(());
            }
            for volume_id in split_ids(&d.volume_id) {
                match self.api.describe_volume(volume_id).await? {
                    Some(info)
                        if info.status == VolumeStatus::InUse
                            && info.instance_id == d.instance_id =>
                    {
                        debug!(%volume_id, "volume already attached; skipping");
                    }
                    _ => self.api.attach_volume(volume_id, &d.instance_id).await?,
                }
            }
            Ok(())
        })
    }

    fn wait_attach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(d) = self.volume_directive(task)? else {
                return Ok(());
            };
            for volume_id in split_ids(&d.volume_id) {
                self.wait_volume(volume_id, d.timeout, VolumeStatus::InUse)
                    .await?;
            }
            Ok(())
        })
    }

    fn detach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(d) = self.volume_directive(task)? else {
                return Ok(());
            };
            if d.volume_id.is_empty() {
                warn!(node_id = %task.node_id, "no volume id; nothing to detach");
                return Ok(());
            }
            for volume_id in split_ids(&d.volume_id) {
                match self.api.describe_volume(volume_id).await? {
                    Some(info) if info.status == VolumeStatus::InUse => {
                        info!(%volume_id, instance_id = %info.instance_id, "detaching volume");
                        self.api.detach_volume(volume_id, &info.instance_id).await?;
                    }
                    _ => debug!(%volume_id, "volume not attached; skipping"),
                }
            }
            Ok(())
        })
    }

    fn wait_detach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(d) = self.volume_directive(task)? else {
                return Ok(());
            };
            for volume_id in split_ids(&d.volume_id) {
                if self.api.describe_volume(volume_id).await?.is_none() {
                    continue;
                }
                self.wait_volume(volume_id, d.timeout, VolumeStatus::Available)
                    .await?;
            }
            Ok(())
        })
    }

    fn delete_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(d) = self.volume_directive(task)? else {
                return Ok(());
            };
            if d.volume_id.is_empty() {
                warn!(node_id = %task.node_id, "no volume id; nothing to delete");
                return Ok(());
            }
            for volume_id in split_ids(&d.volume_id) {
                match self.api.describe_volume(volume_id).await? {
                    None => info!(%volume_id, "volume already gone; skipping"),
                    Some(info) if info.status == VolumeStatus::Deleted => {
                        info!(%volume_id, "volume already deleted; skipping")
                    }
                    Some(_) => {
                        info!(%volume_id, "deleting volume");
                        self.api.delete_volume(volume_id).await?;
                    }
                }
            }
            Ok(())
        })
    }

    fn wait_delete_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(d) = self.volume_directive(task)? else {
                return Ok(());
            };
            for volume_id in split_ids(&d.volume_id) {
                self.wait_volume(volume_id, d.timeout, VolumeStatus::Deleted)
                    .await?;
            }
            Ok(())
        })
    }

    fn wait_frontgate_available<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            if task.directive_is_empty() {
                return Ok(());
            }
            let d: FrontgateWaitDirective = task.decode_directive()?;
            if d.frontgate_id.is_empty() {
                warn!(cluster_id = %d.cluster_id, "no frontgate id; skipping wait");
                return Ok(());
            }
            let what = format!("frontgate {} to be active", d.frontgate_id);
            let api = &*self.api;
            let frontgate_id = d.frontgate_id.as_str();
            self.waiter
                .poll_until(&what, d.timeout, move || async move {
                    let status = match api.describe_frontgate(frontgate_id).await? {
                        Some(FrontgateStatus::Active) => PollStatus::Ready(()),
                        Some(FrontgateStatus::Failed(raw)) => PollStatus::Failed(raw),
                        Some(
                            FrontgateStatus::Pending
                            | FrontgateStatus::Updating
                            | FrontgateStatus::Stopped,
                        ) => {
                            PollStatus::Pending
                        }
                        None => PollStatus::Failed("not found".to_string()),
                    };
                    Ok(status)
                })
                .await
        })
    }

    fn describe_subnet<'a>(
        &'a self,
        _runtime_id: &'a str,
        subnet_id: &'a str,
    ) -> BoxFuture<'a, SubnetInfo> {
        self.api.describe_subnet(subnet_id)
    }

    fn describe_vpc<'a>(&'a self, _runtime_id: &'a str, vpc_id: &'a str) -> BoxFuture<'a, VpcInfo> {
        self.api.describe_vpc(vpc_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_volume_ids_are_split() {
        assert_eq!(split_ids("vol-1, vol-2,,"), vec!["vol-1", "vol-2"]);
        assert!(split_ids("").is_empty());
    }

    #[test]
    fn failed_status_renders_raw_value() {
        assert_eq!(
            InstanceStatus::Failed("ceased".to_string()).to_string(),
            "failed (ceased)"
        );
        assert_eq!(VolumeStatus::InUse.to_string(), "in-use");
    }
}
