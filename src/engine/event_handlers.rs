// src/engine/event_handlers.rs

//! Event handling logic for the core driver.

use tracing::{debug, error, info, warn};

use crate::engine::core::DriverState;
use crate::engine::{DispatchedTask, JobOutcome, TaskKey, TaskOutcome, TaskReport};
use crate::model::Task;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    Dispatch(Vec<DispatchedTask>),
    /// Flip the stop signal so running waits give up.
    Cancel,
    /// The job is over.
    Finish(JobOutcome),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer driver loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub(crate) fn idle() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: true,
        }
    }

    pub(crate) fn finished() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: false,
        }
    }
}

fn finish(state: &mut DriverState, outcome: JobOutcome, mut commands: Vec<CoreCommand>) -> CoreStep {
    match &outcome {
        JobOutcome::Succeeded => info!(tasks = state.reports.len(), "plan finished"),
        JobOutcome::Failed {
            key,
            action,
            node_id,
            error,
        } => error!(%key, %action, %node_id, %error, "plan failed"),
        JobOutcome::Cancelled => warn!("plan cancelled"),
    }
    state.outcome = Some(outcome.clone());
    commands.push(CoreCommand::Finish(outcome));
    CoreStep {
        commands,
        keep_running: false,
    }
}

/// Dispatch the layer after the current one, or finish the job.
///
/// Only called while nothing is in flight.
pub fn dispatch_next_layer(state: &mut DriverState) -> CoreStep {
    if state.cancelled {
        return finish(state, JobOutcome::Cancelled, Vec::new());
    }
    if let Some(failure) = state.failure.clone() {
        return finish(state, failure, Vec::new());
    }

    let next = state.current.map_or(0, |i| i + 1);
    let Some(layer) = state.layers.get_mut(next) else {
        return finish(state, JobOutcome::Succeeded, Vec::new());
    };
    state.current = Some(next);

    let mut tasks = Vec::with_capacity(layer.tasks.len());
    for (index, task) in layer.tasks.iter_mut().enumerate() {
        state.facts.fill(task);
        let key = TaskKey { layer: next, index };
        state.in_flight.insert(key);
        tasks.push(DispatchedTask {
            key,
            task: task.clone(),
        });
    }

    info!(
        layer = next,
        tasks = tasks.len(),
        action = ?layer.action(),
        "dispatching layer"
    );

    if tasks.is_empty() {
        // Layers are never empty in a built plan; move on regardless.
        return dispatch_next_layer(state);
    }

    CoreStep {
        commands: vec![CoreCommand::Dispatch(tasks)],
        keep_running: true,
    }
}

/// Handle a task completion.
///
/// - A success stores the written-back directive and absorbs its facts.
/// - A failure on a `failure_allowed` task is logged and otherwise ignored.
/// - Any other failure is recorded; no further layer is dispatched once the
///   current one drains.
pub fn handle_task_finished(
    state: &mut DriverState,
    key: TaskKey,
    task: Task,
    outcome: TaskOutcome,
) -> CoreStep {
    if !state.in_flight.remove(&key) {
        debug!(%key, "completion for a task that is not in flight; ignoring");
        return CoreStep::idle();
    }

    state.reports.push(TaskReport {
        key,
        action: task.task_action,
        node_id: task.node_id.clone(),
        failure_allowed: task.failure_allowed,
        outcome: outcome.clone(),
    });

    match &outcome {
        TaskOutcome::Succeeded => {
            debug!(%key, action = %task.task_action, node_id = %task.node_id, "task succeeded");
            state.facts.absorb(&task);
            if let Some(slot) = state
                .layers
                .get_mut(key.layer)
                .and_then(|l| l.tasks.get_mut(key.index))
            {
                *slot = task;
            }
        }
        TaskOutcome::Failed(err) if task.failure_allowed => {
            warn!(
                %key,
                action = %task.task_action,
                node_id = %task.node_id,
                error = %err,
                "task failed; failure allowed, continuing"
            );
        }
        TaskOutcome::Failed(err) => {
            error!(
                %key,
                action = %task.task_action,
                node_id = %task.node_id,
                error = %err,
                "task failed"
            );
            if state.failure.is_none() {
                state.failure = Some(JobOutcome::Failed {
                    key,
                    action: task.task_action,
                    node_id: task.node_id.clone(),
                    error: err.clone(),
                });
            }
        }
    }

    if state.in_flight.is_empty() {
        dispatch_next_layer(state)
    } else {
        CoreStep::idle()
    }
}

/// Handle a cancellation request.
pub fn handle_cancel(state: &mut DriverState) -> CoreStep {
    if state.cancelled {
        return CoreStep::idle();
    }
    state.cancelled = true;
    info!(in_flight = state.in_flight.len(), "cancellation requested");

    let commands = vec![CoreCommand::Cancel];
    if state.in_flight.is_empty() {
        return finish(state, JobOutcome::Cancelled, commands);
    }
    CoreStep {
        commands,
        keep_running: true,
    }
}
