// src/plan/frontgate.rs

//! Plan builder for frontgate clusters.
//!
//! A frontgate is the per-VPC proxy between the pilot and the drones of every
//! application cluster in that VPC. It has no lifecycle services; instead the
//! pilot pushes its configuration and mounts its data volume directly.

use serde_json::{Value, json};

use crate::errors::{PitrixError, Result};
use crate::model::{ClusterNode, MountSpec, PilotDirective};
use crate::plan::FrameInterface;
use crate::plan::frame::Frame;
use crate::plan::layer::{TaskLayer, TaskPlan};
use crate::types::TaskAction;

#[derive(Debug, Clone)]
pub struct Frontgate {
    pub frame: Frame,
}

impl Frontgate {
    /// Wrap a frame. Roles without an image take the configured frontgate
    /// image, if any.
    pub fn new(mut frame: Frame) -> Self {
        if let Some(image) = frame.config.frontgate.image_id.clone() {
            for common in frame.wrapper.commons.values_mut() {
                if common.image_id.is_empty() {
                    common.image_id = image.clone();
                }
            }
        }
        Self { frame }
    }

    fn pilot_layer<F>(
        &self,
        action: TaskAction,
        failure_allowed: bool,
        mut fill: F,
    ) -> Result<Option<TaskLayer>>
    where
        F: FnMut(&ClusterNode, &mut PilotDirective) -> Result<()>,
    {
        let frame = &self.frame;
        let mut tasks = Vec::new();
        for node in frame.wrapper.nodes.values() {
            let mut directive = frame.node_pilot_directive(node);
            // The frontgate itself is addressed, not a drone behind it.
            directive.frontgate_id = frame.wrapper.cluster.cluster_id.clone();
            fill(node, &mut directive)?;
            tasks.push(frame.pilot_task(action, &node.node_id, &directive, failure_allowed)?);
        }
        Ok(TaskLayer::non_empty(tasks))
    }

    pub fn ping_frontgate_layer(&self, failure_allowed: bool) -> Result<Option<TaskLayer>> {
        self.pilot_layer(TaskAction::PingFrontgate, failure_allowed, |_, _| Ok(()))
    }

    pub fn ping_metadata_backend_layer(
        &self,
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.pilot_layer(TaskAction::PingMetadataBackend, failure_allowed, |_, _| {
            Ok(())
        })
    }

    pub fn set_frontgate_config_layer(&self, failure_allowed: bool) -> Result<Option<TaskLayer>> {
        self.pilot_layer(TaskAction::SetFrontgateConfig, failure_allowed, |node, d| {
            d.config = Some(self.frontgate_config(node));
            Ok(())
        })
    }

    pub fn format_and_mount_volume_layer(
        &self,
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.mount_layer(TaskAction::FormatAndMountVolume, failure_allowed)
    }

    pub fn umount_volume_layer(&self, failure_allowed: bool) -> Result<Option<TaskLayer>> {
        self.mount_layer(TaskAction::UmountVolume, failure_allowed)
    }

    fn mount_layer(&self, action: TaskAction, failure_allowed: bool) -> Result<Option<TaskLayer>> {
        let wrapper = &self.frame.wrapper;
        let mut tasks = Vec::new();
        for node in wrapper.nodes.values() {
            let role = wrapper.role_of(node)?;
            let Some(mount_point) = role.mount_points.first() else {
                continue;
            };
            if !role.needs_storage() {
                continue;
            }
            let mut directive = self.frame.node_pilot_directive(node);
            directive.frontgate_id = wrapper.cluster.cluster_id.clone();
            directive.volume = Some(MountSpec {
                mount_point: mount_point.clone(),
                file_system: role.file_system.clone(),
                mount_options: role.mount_options.clone(),
                device: node.device.clone(),
            });
            tasks.push(self.frame.pilot_task(
                action,
                &node.node_id,
                &directive,
                failure_allowed,
            )?);
        }
        Ok(TaskLayer::non_empty(tasks))
    }

    pub fn remove_container_layer(&self, failure_allowed: bool) -> Result<Option<TaskLayer>> {
        self.pilot_layer(
            TaskAction::RemoveContainerOnFrontgate,
            failure_allowed,
            |_, _| Ok(()),
        )
    }

    fn frontgate_config(&self, node: &ClusterNode) -> Value {
        let config = &self.frame.config;
        json!({
            "id": self.frame.wrapper.cluster.cluster_id,
            "node_id": node.node_id,
            "host": node.private_ip,
            "listen_port": config.frontgate.listen_port,
            "pilot_host": config.pilot.host,
            "pilot_port": config.pilot.port,
            "etcd_config": {
                "endpoints": config.frontgate.etcd_endpoints,
            },
        })
    }

    fn unsupported(&self) -> PitrixError {
        PitrixError::UnsupportedAction(format!(
            "{} on frontgate cluster {}",
            self.frame.job.job_action, self.frame.wrapper.cluster.cluster_id
        ))
    }
}

impl FrameInterface for Frontgate {
    fn create_cluster_layer(&self) -> Result<TaskPlan> {
        let frame = &self.frame;
        let node_ids = frame.wrapper.node_ids();
        let mut plan = TaskPlan::new();
        plan.append(frame.create_volumes_layer(&node_ids, false)?)
            .append(frame.run_instances_layer(&node_ids, false)?)
            .append(self.ping_frontgate_layer(false)?)
            .append(self.set_frontgate_config_layer(false)?)
            .append(self.format_and_mount_volume_layer(false)?)
            .append(self.remove_container_layer(false)?)
            .append(self.ping_frontgate_layer(false)?)
            .append(self.ping_metadata_backend_layer(false)?);
        Ok(plan)
    }

    fn start_cluster_layer(&self) -> Result<TaskPlan> {
        let frame = &self.frame;
        let node_ids = frame.wrapper.node_ids();
        let mut plan = TaskPlan::new();
        plan.append(frame.start_instances_layer(&node_ids, false)?)
            .append(self.ping_frontgate_layer(false)?)
            .append(self.set_frontgate_config_layer(false)?)
            .append(self.ping_metadata_backend_layer(false)?);
        Ok(plan)
    }

    fn stop_cluster_layer(&self) -> Result<TaskPlan> {
        let node_ids = self.frame.wrapper.node_ids();
        let mut plan = TaskPlan::new();
        plan.append(self.frame.stop_instances_layer(&node_ids, false)?);
        Ok(plan)
    }

    fn delete_cluster_layer(&self) -> Result<TaskPlan> {
        let frame = &self.frame;
        let node_ids = frame.wrapper.node_ids();
        let mut plan = TaskPlan::new();
        if frame.wrapper.cluster.is_active() {
            plan.append(self.umount_volume_layer(true)?)
                .append(frame.stop_instances_layer(&node_ids, true)?)
                .append(frame.detach_volumes_layer(&node_ids, false)?);
        }
        plan.append(frame.delete_instances_layer(&node_ids, false)?)
            .append(frame.delete_volumes_layer(&node_ids, false)?);
        Ok(plan)
    }

    fn add_cluster_nodes_layer(&self) -> Result<TaskPlan> {
        Err(self.unsupported())
    }

    fn delete_cluster_nodes_layer(&self) -> Result<TaskPlan> {
        Err(self.unsupported())
    }
}
