// src/plan/release.rs

//! Plan builder for Kubernetes runtimes.
//!
//! A release is managed as a whole, so every lifecycle job is a single layer
//! holding a single task. The runtime zone doubles as the namespace.

use serde_json::Value;
use tracing::info;

use crate::errors::{PitrixError, Result};
use crate::model::ReleaseDirective;
use crate::plan::FrameInterface;
use crate::plan::frame::Frame;
use crate::plan::layer::{TaskLayer, TaskPlan};
use crate::types::TaskAction;

#[derive(Debug, Clone)]
pub struct ReleaseFrame {
    pub frame: Frame,
}

impl ReleaseFrame {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    fn directive(&self) -> ReleaseDirective {
        let frame = &self.frame;
        let cluster = &frame.wrapper.cluster;
        ReleaseDirective {
            runtime_id: frame.runtime.runtime_id.clone(),
            cluster_id: cluster.cluster_id.clone(),
            namespace: frame.runtime.zone.clone(),
            release_name: cluster.cluster_id.clone(),
            values: Value::Object(cluster.env.clone()),
            timeout: frame.config.wait.timeout.as_secs(),
        }
    }

    fn single_task_plan(&self, action: TaskAction) -> Result<TaskPlan> {
        let frame = &self.frame;
        let task = frame.provider_task(
            action,
            &frame.wrapper.cluster.cluster_id,
            &self.directive(),
            false,
        )?;
        let mut plan = TaskPlan::new();
        plan.append(Some(TaskLayer::new(vec![task])));
        info!(
            job_id = %frame.job.job_id,
            cluster_id = %frame.wrapper.cluster.cluster_id,
            %action,
            "built release plan"
        );
        Ok(plan)
    }

    fn unsupported(&self) -> PitrixError {
        PitrixError::UnsupportedAction(format!(
            "{} on release {}",
            self.frame.job.job_action, self.frame.wrapper.cluster.cluster_id
        ))
    }
}

impl FrameInterface for ReleaseFrame {
    fn create_cluster_layer(&self) -> Result<TaskPlan> {
        self.single_task_plan(TaskAction::RunInstances)
    }

    fn start_cluster_layer(&self) -> Result<TaskPlan> {
        self.single_task_plan(TaskAction::StartInstances)
    }

    fn stop_cluster_layer(&self) -> Result<TaskPlan> {
        self.single_task_plan(TaskAction::StopInstances)
    }

    fn delete_cluster_layer(&self) -> Result<TaskPlan> {
        self.single_task_plan(TaskAction::DeleteInstances)
    }

    fn add_cluster_nodes_layer(&self) -> Result<TaskPlan> {
        Err(self.unsupported())
    }

    fn delete_cluster_nodes_layer(&self) -> Result<TaskPlan> {
        Err(self.unsupported())
    }
}
