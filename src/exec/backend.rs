// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The driver talks to an `ExecutorBackend` instead of calling handlers
//! directly. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation in [`HandlerExecutor`].
//!
//! - `HandlerExecutor` spawns one Tokio task per dispatched task, running the
//!   provider or pilot handler its target names.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were dispatched and directly emits `TaskFinished` events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::{DispatchedTask, DriverEvent};
use crate::errors::Result;
use crate::pilot::PilotHandler;
use crate::provider::Handlers;

use super::task_runner::run_task;

/// Trait abstracting how dispatched tasks are executed.
///
/// Every dispatched task must eventually produce exactly one
/// `DriverEvent::TaskFinished`.
pub trait ExecutorBackend: Send {
    fn dispatch(
        &mut self,
        tasks: Vec<DispatchedTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Executor backend used in production.
pub struct HandlerExecutor {
    handlers: Handlers,
    pilot: Arc<dyn PilotHandler>,
    events: mpsc::Sender<DriverEvent>,
}

impl HandlerExecutor {
    pub fn new(
        handlers: Handlers,
        pilot: Arc<dyn PilotHandler>,
        events: mpsc::Sender<DriverEvent>,
    ) -> Self {
        Self {
            handlers,
            pilot,
            events,
        }
    }
}

impl ExecutorBackend for HandlerExecutor {
    fn dispatch(
        &mut self,
        tasks: Vec<DispatchedTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for dispatched in tasks {
                tokio::spawn(run_task(
                    dispatched,
                    self.handlers.clone(),
                    Arc::clone(&self.pilot),
                    self.events.clone(),
                ));
            }
            Ok(())
        })
    }
}
