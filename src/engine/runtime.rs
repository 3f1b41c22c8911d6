// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::provider::StopSignal;

use super::core::CoreDriver;
use super::{CoreCommand, DispatchedTask, DriverEvent, JobReport};

/// Drives a task plan in response to `DriverEvent`s, and delegates the
/// actual task execution to an `ExecutorBackend`.
///
/// This is an IO shell around `CoreDriver`, which holds all the driver
/// semantics.
pub struct Driver<E: ExecutorBackend> {
    core: CoreDriver,
    event_rx: mpsc::Receiver<DriverEvent>,
    executor: E,
    stop: StopSignal,
}

impl<E: ExecutorBackend> fmt::Debug for Driver<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Driver<E> {
    pub fn new(
        core: CoreDriver,
        event_rx: mpsc::Receiver<DriverEvent>,
        executor: E,
        stop: StopSignal,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            stop,
        }
    }

    /// Main event loop.
    ///
    /// - Dispatches the first layer.
    /// - Feeds every received `DriverEvent` into the core.
    /// - Executes the commands the core returns until it finishes.
    pub async fn run(mut self) -> Result<JobReport> {
        info!("driver started");

        let first = self.core.start();
        let mut keep_running = first.keep_running;
        for command in first.commands {
            self.execute_command(command).await?;
        }

        while keep_running {
            let Some(event) = self.event_rx.recv().await else {
                info!("driver event channel closed; exiting");
                self.stop.stop();
                break;
            };
            debug!(?event, "driver received event");

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command).await?;
            }
            keep_running = step.keep_running;
        }

        info!("driver exiting");
        Ok(self.core.into_report())
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Dispatch(tasks) => self.dispatch(tasks).await?,
            CoreCommand::Cancel => self.stop.stop(),
            CoreCommand::Finish(outcome) => {
                debug!(?outcome, "core finished the job");
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, tasks: Vec<DispatchedTask>) -> Result<()> {
        let keys: Vec<_> = tasks.iter().map(|t| t.key).collect();
        debug!(?keys, "dispatching tasks");
        self.executor.dispatch(tasks).await
    }
}
