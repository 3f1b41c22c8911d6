// src/plan/mod.rs

//! Turning a lifecycle job into a [`TaskPlan`].
//!
//! Responsibilities:
//! - Represent the barrier-ordered plan (`layer.rs`).
//! - Build plans for VM clusters (`frame.rs`, `services.rs`).
//! - Build plans for frontgates (`frontgate.rs`) and Kubernetes releases
//!   (`release.rs`).
//! - Compose the metadata tree registered for confd (`metadata.rs`).
//!
//! Planning is pure: nothing in here talks to a provider or the pilot.

pub mod frame;
pub mod frontgate;
pub mod layer;
pub mod metadata;
pub mod release;
pub mod services;

pub use frame::Frame;
pub use frontgate::Frontgate;
pub use layer::{TaskLayer, TaskPlan};
pub use release::ReleaseFrame;

use tracing::debug;

use crate::config::PlanConfig;
use crate::errors::{PitrixError, Result};
use crate::model::{Job, RuntimeDetails};
use crate::types::{ClusterType, JobAction, Provider};

/// Lifecycle plan builders shared by every frame kind.
pub trait FrameInterface: Send + Sync {
    fn create_cluster_layer(&self) -> Result<TaskPlan>;
    fn start_cluster_layer(&self) -> Result<TaskPlan>;
    fn stop_cluster_layer(&self) -> Result<TaskPlan>;
    fn delete_cluster_layer(&self) -> Result<TaskPlan>;
    fn add_cluster_nodes_layer(&self) -> Result<TaskPlan>;
    fn delete_cluster_nodes_layer(&self) -> Result<TaskPlan>;

    /// Dispatch on the job action.
    fn plan_for(&self, action: JobAction) -> Result<TaskPlan> {
        match action {
            JobAction::CreateCluster => self.create_cluster_layer(),
            JobAction::StartClusters => self.start_cluster_layer(),
            JobAction::StopClusters => self.stop_cluster_layer(),
            JobAction::DeleteClusters => self.delete_cluster_layer(),
            JobAction::AddClusterNodes => self.add_cluster_nodes_layer(),
            JobAction::DeleteClusterNodes => self.delete_cluster_nodes_layer(),
        }
    }
}

/// Pick the frame kind for a job from its runtime and cluster type.
pub fn new_frame(
    job: Job,
    runtime: RuntimeDetails,
    config: PlanConfig,
) -> Result<Box<dyn FrameInterface>> {
    if job.provider != runtime.provider {
        return Err(PitrixError::ConfigError(format!(
            "job {} targets provider {} but runtime {} is {}",
            job.job_id, job.provider, runtime.runtime_id, runtime.provider
        )));
    }

    let provider = runtime.provider;
    let frame = Frame::new(job, runtime, config)?;
    let cluster_type = frame.wrapper.cluster.cluster_type;
    debug!(%provider, ?cluster_type, "selecting frame");

    match (provider, cluster_type) {
        (Provider::Kubernetes, ClusterType::Normal) => Ok(Box::new(ReleaseFrame::new(frame))),
        (Provider::Kubernetes, ClusterType::Frontgate) => Err(PitrixError::UnsupportedAction(
            "frontgate clusters cannot run on a kubernetes runtime".to_string(),
        )),
        (_, ClusterType::Frontgate) => Ok(Box::new(Frontgate::new(frame))),
        (_, ClusterType::Normal) => Ok(Box::new(frame)),
    }
}

/// Build the full task plan for `job`.
pub fn build_plan(job: Job, runtime: RuntimeDetails, config: PlanConfig) -> Result<TaskPlan> {
    let action = job.job_action;
    let frame = new_frame(job, runtime, config)?;
    frame.plan_for(action)
}
