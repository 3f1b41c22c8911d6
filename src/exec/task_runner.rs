// src/exec/task_runner.rs

//! Individual task runner.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::engine::{DispatchedTask, DriverEvent, TaskOutcome};
use crate::errors::Result;
use crate::model::Task;
use crate::pilot::PilotHandler;
use crate::provider::Handlers;
use crate::types::Target;

/// Run one task (handle, then wait) and report a `TaskFinished` event.
///
/// The event carries the task as the handler left it, so write-backs reach
/// the driver.
pub async fn run_task(
    dispatched: DispatchedTask,
    handlers: Handlers,
    pilot: Arc<dyn PilotHandler>,
    events: mpsc::Sender<DriverEvent>,
) {
    let DispatchedTask { key, mut task } = dispatched;
    info!(
        %key,
        job_id = %task.job_id,
        action = %task.task_action,
        target = %task.target,
        node_id = %task.node_id,
        "running task"
    );

    let outcome = match execute(&mut task, &handlers, pilot.as_ref()).await {
        Ok(()) => TaskOutcome::Succeeded,
        Err(err) => {
            error!(%key, action = %task.task_action, node_id = %task.node_id, error = %err, "task execution error");
            TaskOutcome::Failed(err.to_string())
        }
    };

    if events
        .send(DriverEvent::TaskFinished { key, task, outcome })
        .await
        .is_err()
    {
        debug!(%key, "driver is gone; dropping task completion");
    }
}

async fn execute(task: &mut Task, handlers: &Handlers, pilot: &dyn PilotHandler) -> Result<()> {
    match task.target {
        Target::Pilot => {
            pilot.handle_subtask(task).await?;
            pilot.wait_subtask(task).await
        }
        Target::Provider(provider) => {
            let handler = handlers.get(provider)?;
            handler.handle_subtask(task).await?;
            handler.wait_subtask(task).await
        }
    }
}
