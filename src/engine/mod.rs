// src/engine/mod.rs

//! Execution driver for task plans.
//!
//! The driver walks a [`TaskPlan`](crate::plan::TaskPlan) layer by layer:
//! every task of a layer is dispatched at once, and the next layer starts
//! only after each of them (handle and wait) has reported back.
//!
//! The pure core state machine lives in [`core`] with its event handlers in
//! [`event_handlers`]; the async/IO shell is implemented in [`runtime`].
//! Ids learned along the way are tracked in [`facts`].

use std::fmt;

use crate::model::Task;
use crate::types::TaskAction;

/// Position of a task inside a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub layer: usize,
    pub index: usize,
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.layer, self.index)
    }
}

/// Result of running one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
}

/// A task handed to the executor.
#[derive(Debug, Clone)]
pub struct DispatchedTask {
    pub key: TaskKey,
    pub task: Task,
}

/// Events flowing into the driver.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// A task finished; `task` carries the directive as written back by its
    /// handler.
    TaskFinished {
        key: TaskKey,
        task: Task,
        outcome: TaskOutcome,
    },
    /// Stop dispatching and cancel running waits.
    CancelRequested,
}

/// Final state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed {
        key: TaskKey,
        action: TaskAction,
        node_id: String,
        error: String,
    },
    Cancelled,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// What happened to one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub key: TaskKey,
    pub action: TaskAction,
    pub node_id: String,
    pub failure_allowed: bool,
    pub outcome: TaskOutcome,
}

/// Summary handed back once the driver stops.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub outcome: JobOutcome,
    /// Reports in completion order.
    pub tasks: Vec<TaskReport>,
}

pub mod core;
pub mod event_handlers;
pub mod facts;
pub mod runtime;

pub use core::CoreDriver;
pub use event_handlers::{CoreCommand, CoreStep};
pub use facts::{FactBook, NodeFacts};
pub use runtime::Driver;
