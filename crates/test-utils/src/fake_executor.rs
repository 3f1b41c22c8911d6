use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use pitrix::engine::{DispatchedTask, DriverEvent, TaskOutcome};
use pitrix::errors::Result;
use pitrix::exec::ExecutorBackend;
use pitrix::types::TaskAction;

/// `(action, node_id)` of every task in one dispatch call.
pub type Batch = Vec<(TaskAction, String)>;

/// A fake executor that:
/// - records each dispatched batch
/// - immediately reports TaskFinished for each task, failing the
///   `(action, node)` pairs registered with [`FakeExecutor::failing`].
pub struct FakeExecutor {
    events: mpsc::Sender<DriverEvent>,
    batches: Arc<Mutex<Vec<Batch>>>,
    failures: BTreeSet<(String, String)>,
}

impl FakeExecutor {
    pub fn new(events: mpsc::Sender<DriverEvent>, batches: Arc<Mutex<Vec<Batch>>>) -> Self {
        Self {
            events,
            batches,
            failures: BTreeSet::new(),
        }
    }

    pub fn failing(mut self, action: TaskAction, node_id: &str) -> Self {
        self.failures
            .insert((action.to_string(), node_id.to_string()));
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(
        &mut self,
        tasks: Vec<DispatchedTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.events.clone();
        let batches = Arc::clone(&self.batches);

        Box::pin(async move {
            {
                let mut guard = batches.lock().unwrap();
                guard.push(
                    tasks
                        .iter()
                        .map(|t| (t.task.task_action, t.task.node_id.clone()))
                        .collect(),
                );
            }

            for DispatchedTask { key, task } in tasks {
                let pair = (task.task_action.to_string(), task.node_id.clone());
                let outcome = if self.failures.contains(&pair) {
                    TaskOutcome::Failed(format!("{} failed on {}", task.task_action, task.node_id))
                } else {
                    TaskOutcome::Succeeded
                };
                tx.send(DriverEvent::TaskFinished { key, task, outcome })
                    .await
                    .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
