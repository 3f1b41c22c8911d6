// src/plan/services.rs

//! Ordering of lifecycle service commands.
//!
//! For one service kind and a candidate node set:
//!
//! 1. keep nodes whose role declares the service with a non-empty command and
//!    whose agent is installed;
//! 2. group them by role (primary and replica groups are distinct);
//! 3. cap each group at `nodes_to_execute_on` (all nodes when unset). A
//!    replica group that would be capped is dropped entirely;
//! 4. bucket the surviving nodes by the service `order`; each bucket becomes
//!    one layer and buckets run in ascending order.

use std::collections::BTreeMap;

use tracing::debug;

use crate::errors::Result;
use crate::model::{ClusterNode, CmdSpec, PilotDirective, ServiceSpec, Task};
use crate::plan::frame::Frame;
use crate::plan::layer::{TaskLayer, TaskPlan};
use crate::types::{Role, ServiceKind, TaskAction};

impl Frame {
    /// RegisterCmd tasks for `kind`, bucketed by service order.
    pub fn construct_service_tasks(
        &self,
        kind: &ServiceKind,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<BTreeMap<i32, Vec<Task>>> {
        let mut by_role: BTreeMap<Role, Vec<&ClusterNode>> = BTreeMap::new();
        for node_id in node_ids {
            let node = self.wrapper.node(node_id)?;
            let common = self.wrapper.common_of(node)?;
            let declares = common.service(kind).is_some_and(ServiceSpec::has_cmd);
            if !declares || !common.agent_installed {
                continue;
            }
            by_role.entry(node.role.clone()).or_default().push(node);
        }

        let mut by_order: BTreeMap<i32, Vec<Task>> = BTreeMap::new();
        for (role, mut nodes) in by_role {
            nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));

            let first = nodes[0];
            let Some(spec) = self.wrapper.common_of(first)?.service(kind) else {
                continue;
            };

            let exec_nodes = if spec.nodes_to_execute_on > 0 {
                spec.nodes_to_execute_on
            } else {
                nodes.len()
            };

            if exec_nodes < nodes.len() && role.is_replica() {
                debug!(
                    role = %role,
                    service = %kind,
                    nodes = nodes.len(),
                    exec_nodes,
                    "replica role capped below its size; skipping service for the whole role"
                );
                continue;
            }

            for node in nodes.into_iter().take(exec_nodes) {
                let task = self.register_cmd_task(kind, spec, node, failure_allowed)?;
                by_order.entry(spec.order).or_default().push(task);
            }
        }

        Ok(by_order)
    }

    /// Service tasks chained into one layer per order, lowest order first.
    pub fn service_plan(
        &self,
        kind: &ServiceKind,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskPlan>> {
        let by_order = self.construct_service_tasks(kind, node_ids, failure_allowed)?;
        let mut plan = TaskPlan::new();
        for (_order, tasks) in by_order {
            plan.append(TaskLayer::non_empty(tasks));
        }
        Ok(plan.non_empty())
    }

    /// Split nodes by whether their init service runs before or after start.
    pub fn pre_and_post_init_nodes(
        &self,
        node_ids: &[String],
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mut pre = Vec::new();
        let mut post = Vec::new();
        for node_id in node_ids {
            let node = self.wrapper.node(node_id)?;
            let post_start = self
                .wrapper
                .common_of(node)?
                .service(&ServiceKind::Init)
                .is_some_and(|s| s.post_start_service);
            if post_start {
                post.push(node_id.clone());
            } else {
                pre.push(node_id.clone());
            }
        }
        Ok((pre, post))
    }

    /// Start confd, then pre-start init, start, post-start init.
    pub fn init_and_start_service_plan(
        &self,
        node_ids: &[String],
        failure_allowed: bool,
    ) -> Result<Option<TaskPlan>> {
        let (pre, post) = self.pre_and_post_init_nodes(node_ids)?;

        let mut plan = TaskPlan::new();
        plan.append(self.start_confd_layer(node_ids, failure_allowed)?)
            .append_plan(self.service_plan(&ServiceKind::Init, &pre, failure_allowed)?)
            .append_plan(self.service_plan(&ServiceKind::Start, node_ids, failure_allowed)?)
            .append_plan(self.service_plan(&ServiceKind::Init, &post, failure_allowed)?);
        Ok(plan.non_empty())
    }

    fn register_cmd_task(
        &self,
        kind: &ServiceKind,
        spec: &ServiceSpec,
        node: &ClusterNode,
        failure_allowed: bool,
    ) -> Result<Task> {
        let timeout = self.timeout_or_default(spec.timeout);
        let directive = PilotDirective {
            cluster_id: self.wrapper.cluster.cluster_id.clone(),
            frontgate_id: self.wrapper.cluster.frontgate_id.clone(),
            node_id: node.node_id.clone(),
            instance_id: node.instance_id.clone(),
            drone_ip: node.private_ip.clone(),
            timeout,
            cmd: Some(CmdSpec {
                id: format!("{}/{}/{}", self.job.job_id, kind, node.node_id),
                cmd: spec.cmd.clone(),
                timeout,
            }),
            ..Default::default()
        };
        self.pilot_task(TaskAction::RegisterCmd, &node.node_id, &directive, failure_allowed)
    }
}
