// src/model/mod.rs

//! Data model consumed and produced by the planner.
//!
//! - [`cluster`] holds the raw and validated cluster documents.
//! - [`service`] decodes lifecycle service descriptors.
//! - [`job`] holds the job and runtime records that start a plan.
//! - [`task`] holds tasks and their per-action directive payloads.

pub mod cluster;
pub mod job;
pub mod service;
pub mod task;

pub use cluster::{
    Cluster, ClusterCommon, ClusterLink, ClusterLoadbalancer, ClusterNode, ClusterRole,
    ClusterWrapper, RawCluster, RawClusterCommon, RawClusterNode, RawClusterRole,
    RawClusterWrapper,
};
pub use job::{Credential, Job, RuntimeDetails};
pub use service::ServiceSpec;
pub use task::{
    CmdSpec, FrontgateWaitDirective, InstanceDirective, MountSpec, PilotDirective,
    ReleaseDirective, Task, VolumeDirective,
};
