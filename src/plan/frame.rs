// src/plan/frame.rs

//! Plan builder for VM-based application clusters.
//!
//! Each `*_layer` method decides on its own whether it has work and returns
//! `None` when it does not, so the lifecycle builders can chain stages
//! unconditionally.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::PlanConfig;
use crate::errors::{PitrixError, Result};
use crate::model::{
    ClusterNode, ClusterWrapper, FrontgateWaitDirective, InstanceDirective, Job, PilotDirective,
    RuntimeDetails, Task, VolumeDirective,
};
use crate::plan::layer::{TaskLayer, TaskPlan};
use crate::plan::metadata;
use crate::plan::FrameInterface;
use crate::types::{STATUS_DELETING, STATUS_PENDING, ServiceKind, TaskAction, Target};

/// Plan builder state for one job.
#[derive(Debug, Clone)]
pub struct Frame {
    pub job: Job,
    pub wrapper: ClusterWrapper,
    pub runtime: RuntimeDetails,
    pub config: PlanConfig,
}

impl Frame {
    /// Parse the job directive and build a frame for it.
    pub fn new(job: Job, runtime: RuntimeDetails, config: PlanConfig) -> Result<Self> {
        let wrapper = ClusterWrapper::from_directive(&job.directive, &config.defaults)?;
        Ok(Self::with_wrapper(job, wrapper, runtime, config))
    }

    pub fn with_wrapper(
        job: Job,
        wrapper: ClusterWrapper,
        runtime: RuntimeDetails,
        config: PlanConfig,
    ) -> Self {
        Self {
            job,
            wrapper,
            runtime,
            config,
        }
    }

    pub(crate) fn timeout_or_default(&self, secs: u64) -> u64 {
        if secs > 0 {
            secs
        } else {
            self.config.wait.timeout.as_secs()
        }
    }

    fn task<D: Serialize>(
        &self,
        action: TaskAction,
        target: Target,
        node_id: &str,
        directive: &D,
        failure_allowed: bool,
        timeout: u64,
    ) -> Result<Task> {
        Ok(Task {
            job_id: self.job.job_id.clone(),
            owner: self.job.owner.clone(),
            task_action: action,
            target,
            node_id: node_id.to_string(),
            directive: serde_json::to_value(directive)?,
            failure_allowed,
            timeout,
        })
    }

    pub(crate) fn pilot_task(
        &self,
        action: TaskAction,
        node_id: &str,
        directive: &PilotDirective,
        failure_allowed: bool,
    ) -> Result<Task> {
        self.task(
            action,
            Target::Pilot,
            node_id,
            directive,
            failure_allowed,
            directive.timeout,
        )
    }

    pub(crate) fn provider_task<D: Serialize>(
        &self,
        action: TaskAction,
        node_id: &str,
        directive: &D,
        failure_allowed: bool,
    ) -> Result<Task> {
        self.task(
            action,
            Target::Provider(self.runtime.provider),
            node_id,
            directive,
            failure_allowed,
            self.config.wait.timeout.as_secs(),
        )
    }

    /// Pilot directive addressed at a node's drone.
    pub(crate) fn node_pilot_directive(&self, node: &ClusterNode) -> PilotDirective {
        PilotDirective {
            cluster_id: self.wrapper.cluster.cluster_id.clone(),
            frontgate_id: self.wrapper.cluster.frontgate_id.clone(),
            node_id: node.node_id.clone(),
            instance_id: node.instance_id.clone(),
            drone_ip: node.private_ip.clone(),
            timeout: self.config.wait.timeout.as_secs(),
            ..Default::default()
        }
    }

    /// Nodes whose agent is installed; pilot tasks only target those.
    fn agent_nodes<'a>(&'a self, node_ids: &[String]) -> Result<Vec<&'a ClusterNode>> {
        let mut nodes = Vec::new();
        for node_id in node_ids {
            let node = self.wrapper.node(node_id)?;
            if self.wrapper.common_of(node)?.agent_installed {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn image_for(&self, node: &ClusterNode) -> Result<String> {
        let common = self.wrapper.common_of(node)?;
        if !common.image_id.is_empty() {
            return Ok(common.image_id.clone());
        }
        self.config.defaults.image_id.clone().ok_or_else(|| {
            PitrixError::InvalidCluster(format!(
                "role '{}' has no image and no default image is configured",
                node.role
            ))
        })
    }

    pub(crate) fn instance_directive(&self, node: &ClusterNode) -> Result<InstanceDirective> {
        let role = self.wrapper.role_of(node)?;
        let subnet = if node.subnet_id.is_empty() {
            self.wrapper.cluster.subnet_id.clone()
        } else {
            node.subnet_id.clone()
        };
        Ok(InstanceDirective {
            runtime_id: self.runtime.runtime_id.clone(),
            name: node.node_id.clone(),
            node_id: node.node_id.clone(),
            role: node.role.to_string(),
            image_id: self.image_for(node)?,
            cpu: role.cpu,
            memory: role.memory,
            gpu: role.gpu,
            instance_class: role.instance_class,
            instance_size: role.instance_size,
            subnet,
            zone: self.runtime.zone.clone(),
            hostname: node.node_id.clone(),
            instance_id: node.instance_id.clone(),
            volume_id: node.volume_id.clone(),
            private_ip: node.private_ip.clone(),
            device: node.device.clone(),
            timeout: self.config.wait.timeout.as_secs(),
        })
    }

    /// One CreateVolumes task per (node, mount point) needing storage.
    pub fn create_volumes_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        let mut tasks = Vec::new();
        for node_id in node_ids {
            let node = self.wrapper.node(node_id)?;
            let role = self.wrapper.role_of(node)?;
            if !role.needs_storage() {
                continue;
            }
            let size = role.volume_size_per_mount();
            for (idx, mount_point) in role.mount_points.iter().enumerate() {
                let directive = VolumeDirective {
                    runtime_id: self.runtime.runtime_id.clone(),
                    name: format!("{}_{}", node.node_id, idx),
                    node_id: node.node_id.clone(),
                    size,
                    zone: self.runtime.zone.clone(),
                    mount_point: mount_point.clone(),
                    timeout: self.config.wait.timeout.as_secs(),
                    ..Default::default()
                };
                tasks.push(self.provider_task(
                    TaskAction::CreateVolumes,
                    &node.node_id,
                    &directive,
                    failure_allowed,
                )?);
            }
        }
        Ok(TaskLayer::non_empty(tasks))
    }

    /// Volume teardown tasks (detach or delete), one per node with storage.
    fn volume_teardown_layer(
        &self,
        action: TaskAction,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        let mut tasks = Vec::new();
        for node_id in node_ids {
            let node = self.wrapper.node(node_id)?;
            let role = self.wrapper.role_of(node)?;
            if !role.needs_storage() && node.volume_id.is_empty() {
                continue;
            }
            let directive = VolumeDirective {
                runtime_id: self.runtime.runtime_id.clone(),
                name: node.node_id.clone(),
                node_id: node.node_id.clone(),
                zone: self.runtime.zone.clone(),
                volume_id: node.volume_id.clone(),
                instance_id: node.instance_id.clone(),
                timeout: self.config.wait.timeout.as_secs(),
                ..Default::default()
            };
            tasks.push(self.provider_task(action, &node.node_id, &directive, failure_allowed)?);
        }
        Ok(TaskLayer::non_empty(tasks))
    }

    pub fn detach_volumes_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.volume_teardown_layer(TaskAction::DetachVolumes, node_ids, failure_allowed)
    }

    pub fn delete_volumes_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.volume_teardown_layer(TaskAction::DeleteVolumes, node_ids, failure_allowed)
    }

    fn instances_layer(
        &self,
        action: TaskAction,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        let mut tasks = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            let node = self.wrapper.node(node_id)?;
            let directive = self.instance_directive(node)?;
            tasks.push(self.provider_task(action, &node.node_id, &directive, failure_allowed)?);
        }
        Ok(TaskLayer::non_empty(tasks))
    }

    pub fn run_instances_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.instances_layer(TaskAction::RunInstances, node_ids, failure_allowed)
    }

    pub fn start_instances_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.instances_layer(TaskAction::StartInstances, node_ids, failure_allowed)
    }

    pub fn stop_instances_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.instances_layer(TaskAction::StopInstances, node_ids, failure_allowed)
    }

    pub fn delete_instances_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.instances_layer(TaskAction::DeleteInstances, node_ids, failure_allowed)
    }

    /// Single task blocking until the cluster's frontgate is usable.
    pub fn wait_frontgate_layer(&self, failure_allowed: bool) -> Result<Option<TaskLayer>> {
        let cluster = &self.wrapper.cluster;
        if cluster.frontgate_id.is_empty() {
            debug!(cluster_id = %cluster.cluster_id, "cluster has no frontgate; skipping wait");
            return Ok(None);
        }
        let directive = FrontgateWaitDirective {
            cluster_id: cluster.cluster_id.clone(),
            frontgate_id: cluster.frontgate_id.clone(),
            timeout: self.config.wait.timeout.as_secs(),
        };
        let task = self.provider_task(
            TaskAction::WaitFrontgateAvailable,
            &cluster.cluster_id,
            &directive,
            failure_allowed,
        )?;
        Ok(Some(TaskLayer::new(vec![task])))
    }

    fn cluster_pilot_directive(&self) -> PilotDirective {
        let cluster = &self.wrapper.cluster;
        PilotDirective {
            cluster_id: cluster.cluster_id.clone(),
            frontgate_id: cluster.frontgate_id.clone(),
            node_id: cluster.cluster_id.clone(),
            timeout: self.config.wait.timeout.as_secs(),
            ..Default::default()
        }
    }

    /// Single task registering the whole metadata tree.
    pub fn register_metadata_layer(&self, failure_allowed: bool) -> Result<Option<TaskLayer>> {
        let mut directive = self.cluster_pilot_directive();
        directive.cnodes = Some(metadata::compose(&self.wrapper)?);
        let task = self.pilot_task(
            TaskAction::RegisterMetadata,
            &self.wrapper.cluster.cluster_id,
            &directive,
            failure_allowed,
        )?;
        Ok(Some(TaskLayer::new(vec![task])))
    }

    pub fn deregister_metadata_layer(&self, failure_allowed: bool) -> Result<Option<TaskLayer>> {
        let directive = self.cluster_pilot_directive();
        let task = self.pilot_task(
            TaskAction::DeregisterMetadata,
            &self.wrapper.cluster.cluster_id,
            &directive,
            failure_allowed,
        )?;
        Ok(Some(TaskLayer::new(vec![task])))
    }

    /// Host records of the given nodes, one task per node.
    pub fn register_nodes_metadata_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        let mut tasks = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            let node = self.wrapper.node(node_id)?;
            let mut directive = self.node_pilot_directive(node);
            directive.cnodes = Some(metadata::compose_nodes(
                &self.wrapper,
                std::slice::from_ref(node_id),
            )?);
            tasks.push(self.pilot_task(
                TaskAction::RegisterNodesMetadata,
                node_id,
                &directive,
                failure_allowed,
            )?);
        }
        Ok(TaskLayer::non_empty(tasks))
    }

    pub fn deregister_nodes_metadata_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.per_node_pilot_layer(
            TaskAction::DeregisterNodesMetadata,
            node_ids,
            failure_allowed,
            false,
        )
    }

    fn per_node_pilot_layer(
        &self,
        action: TaskAction,
        node_ids: &[String],
        failure_allowed: bool,
        agent_only: bool,
    ) -> Result<Option<TaskLayer>> {
        let nodes = if agent_only {
            self.agent_nodes(node_ids)?
        } else {
            node_ids
                .iter()
                .map(|id| self.wrapper.node(id))
                .collect::<Result<Vec<_>>>()?
        };
        let mut tasks = Vec::with_capacity(nodes.len());
        for node in nodes {
            let directive = self.node_pilot_directive(node);
            tasks.push(self.pilot_task(action, &node.node_id, &directive, failure_allowed)?);
        }
        Ok(TaskLayer::non_empty(tasks))
    }

    pub fn start_confd_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.per_node_pilot_layer(TaskAction::StartConfd, node_ids, failure_allowed, true)
    }

    pub fn stop_confd_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.per_node_pilot_layer(TaskAction::StopConfd, node_ids, failure_allowed, true)
    }

    pub fn deregister_cmd_layer(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskLayer>> {
        self.per_node_pilot_layer(TaskAction::DeregisterCmd, node_ids, failure_allowed, true)
    }

    fn log_plan(&self, plan: &TaskPlan) {
        info!(
            job_id = %self.job.job_id,
            cluster_id = %self.wrapper.cluster.cluster_id,
            action = %self.job.job_action,
            layers = plan.len(),
            tasks = plan.task_count(),
            "built task plan"
        );
    }
}

impl FrameInterface for Frame {
    fn create_cluster_layer(&self) -> Result<TaskPlan> {
        let node_ids = self.wrapper.node_ids();
        let mut plan = TaskPlan::new();
        plan.append(self.create_volumes_layer(&node_ids, false)?)
            .append(self.run_instances_layer(&node_ids, false)?)
            .append(self.wait_frontgate_layer(false)?)
            .append(self.register_metadata_layer(false)?)
            .append_plan(self.init_and_start_service_plan(&node_ids, false)?)
            .append(self.deregister_cmd_layer(&node_ids, true)?);
        self.log_plan(&plan);
        Ok(plan)
    }

    fn start_cluster_layer(&self) -> Result<TaskPlan> {
        let node_ids = self.wrapper.node_ids();
        let mut plan = TaskPlan::new();
        plan.append(self.start_instances_layer(&node_ids, false)?)
            .append(self.wait_frontgate_layer(false)?)
            .append(self.register_metadata_layer(false)?)
            .append(self.start_confd_layer(&node_ids, false)?)
            .append_plan(self.service_plan(&ServiceKind::Start, &node_ids, false)?)
            .append(self.deregister_cmd_layer(&node_ids, true)?);
        self.log_plan(&plan);
        Ok(plan)
    }

    fn stop_cluster_layer(&self) -> Result<TaskPlan> {
        let node_ids = self.wrapper.node_ids();
        let mut plan = TaskPlan::new();
        plan.append_plan(self.service_plan(&ServiceKind::Stop, &node_ids, false)?)
            .append(self.deregister_cmd_layer(&node_ids, true)?)
            .append(self.stop_confd_layer(&node_ids, true)?)
            .append(self.deregister_metadata_layer(true)?)
            .append(self.stop_instances_layer(&node_ids, false)?);
        self.log_plan(&plan);
        Ok(plan)
    }

    fn delete_cluster_layer(&self) -> Result<TaskPlan> {
        let node_ids = self.wrapper.node_ids();
        let mut plan = TaskPlan::new();
        if self.wrapper.cluster.is_active() {
            plan.append_plan(self.service_plan(&ServiceKind::Destroy, &node_ids, true)?)
                .append(self.deregister_cmd_layer(&node_ids, true)?)
                .append(self.stop_confd_layer(&node_ids, true)?)
                .append(self.stop_instances_layer(&node_ids, true)?)
                .append(self.detach_volumes_layer(&node_ids, true)?);
        }
        plan.append(self.deregister_metadata_layer(true)?)
            .append(self.delete_instances_layer(&node_ids, false)?)
            .append(self.delete_volumes_layer(&node_ids, false)?);
        self.log_plan(&plan);
        Ok(plan)
    }

    fn add_cluster_nodes_layer(&self) -> Result<TaskPlan> {
        let new_ids = self.wrapper.node_ids_with_status(STATUS_PENDING);
        if new_ids.is_empty() {
            return Err(PitrixError::InvalidCluster(format!(
                "no nodes with status '{STATUS_PENDING}' to add"
            )));
        }
        let existing_ids = self.wrapper.node_ids_without_status(STATUS_PENDING);
        let all_ids = self.wrapper.node_ids();

        let mut plan = TaskPlan::new();
        plan.append(self.create_volumes_layer(&new_ids, false)?)
            .append(self.run_instances_layer(&new_ids, false)?)
            .append(self.wait_frontgate_layer(false)?)
            .append(self.register_nodes_metadata_layer(&new_ids, false)?)
            .append_plan(self.init_and_start_service_plan(&new_ids, false)?)
            .append_plan(self.service_plan(&ServiceKind::ScaleOut, &existing_ids, false)?)
            .append(self.deregister_cmd_layer(&all_ids, true)?);
        self.log_plan(&plan);
        Ok(plan)
    }

    fn delete_cluster_nodes_layer(&self) -> Result<TaskPlan> {
        let doomed_ids = self.wrapper.node_ids_with_status(STATUS_DELETING);
        if doomed_ids.is_empty() {
            return Err(PitrixError::InvalidCluster(format!(
                "no nodes with status '{STATUS_DELETING}' to delete"
            )));
        }
        let remaining_ids = self.wrapper.node_ids_without_status(STATUS_DELETING);
        let all_ids = self.wrapper.node_ids();

        let mut plan = TaskPlan::new();
        plan.append_plan(self.service_plan(&ServiceKind::ScaleIn, &remaining_ids, false)?)
            .append_plan(self.service_plan(&ServiceKind::Destroy, &doomed_ids, true)?)
            .append(self.deregister_cmd_layer(&all_ids, true)?)
            .append(self.stop_confd_layer(&doomed_ids, true)?)
            .append(self.deregister_nodes_metadata_layer(&doomed_ids, false)?)
            .append(self.stop_instances_layer(&doomed_ids, true)?)
            .append(self.detach_volumes_layer(&doomed_ids, true)?)
            .append(self.delete_instances_layer(&doomed_ids, false)?)
            .append(self.delete_volumes_layer(&doomed_ids, false)?);
        self.log_plan(&plan);
        Ok(plan)
    }
}
