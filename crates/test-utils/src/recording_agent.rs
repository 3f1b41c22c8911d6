use std::sync::{Mutex, MutexGuard};

use pitrix::BoxFuture;
use pitrix::errors::PitrixError;
use pitrix::model::PilotDirective;
use pitrix::pilot::AgentTransport;
use pitrix::types::TaskAction;

/// Agent transport that records every call and succeeds, unless told to fail
/// one action.
#[derive(Debug, Default)]
pub struct RecordingAgent {
    calls: Mutex<Vec<(TaskAction, String)>>,
    waited: Mutex<Vec<String>>,
    fail_on: Option<TaskAction>,
}

impl RecordingAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(action: TaskAction) -> Self {
        Self {
            fail_on: Some(action),
            ..Self::default()
        }
    }

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().expect("recording agent poisoned")
    }

    /// `(action, node_id)` per forwarded call.
    pub fn calls(&self) -> Vec<(TaskAction, String)> {
        Self::lock(&self.calls).clone()
    }

    /// Command ids waited on.
    pub fn waited(&self) -> Vec<String> {
        Self::lock(&self.waited).clone()
    }
}

impl AgentTransport for RecordingAgent {
    fn call<'a>(&'a self, action: TaskAction, directive: &'a PilotDirective) -> BoxFuture<'a> {
        Box::pin(async move {
            Self::lock(&self.calls).push((action, directive.node_id.clone()));
            if self.fail_on == Some(action) {
                return Err(PitrixError::UnsupportedAction(format!(
                    "drone on {} rejected {action}",
                    directive.node_id
                )));
            }
            Ok(())
        })
    }

    fn wait_cmd<'a>(&'a self, directive: &'a PilotDirective) -> BoxFuture<'a> {
        Box::pin(async move {
            let id = directive
                .cmd
                .as_ref()
                .map(|c| c.id.clone())
                .unwrap_or_default();
            Self::lock(&self.waited).push(id);
            Ok(())
        })
    }
}
