// src/engine/core.rs

//! Pure core driver state machine.
//!
//! This module contains a synchronous, deterministic "core driver" that
//! consumes [`DriverEvent`]s and produces:
//! - an updated core state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Driver`) reads events from a channel,
//! hands dispatched tasks to the executor and flips the stop signal on
//! cancellation. The core has no Tokio types and performs no IO, so it is
//! unit tested directly.

use std::collections::BTreeSet;

use crate::engine::event_handlers::{
    CoreStep, dispatch_next_layer, handle_cancel, handle_task_finished,
};
use crate::engine::facts::FactBook;
use crate::engine::{DriverEvent, JobOutcome, JobReport, TaskKey, TaskReport};
use crate::plan::{TaskLayer, TaskPlan};

/// Mutable state shared by the event handlers.
#[derive(Debug)]
pub(crate) struct DriverState {
    pub(crate) layers: Vec<TaskLayer>,
    /// Index of the layer currently running, if any has started.
    pub(crate) current: Option<usize>,
    pub(crate) in_flight: BTreeSet<TaskKey>,
    pub(crate) facts: FactBook,
    /// First non-allowed failure; stops dispatch once the layer drains.
    pub(crate) failure: Option<JobOutcome>,
    pub(crate) cancelled: bool,
    pub(crate) outcome: Option<JobOutcome>,
    pub(crate) reports: Vec<TaskReport>,
}

#[derive(Debug)]
pub struct CoreDriver {
    state: DriverState,
}

impl CoreDriver {
    pub fn new(plan: TaskPlan) -> Self {
        Self {
            state: DriverState {
                layers: plan.into_layers(),
                current: None,
                in_flight: BTreeSet::new(),
                facts: FactBook::new(),
                failure: None,
                cancelled: false,
                outcome: None,
                reports: Vec::new(),
            },
        }
    }

    /// Dispatch the first layer (or finish at once for an empty plan).
    pub fn start(&mut self) -> CoreStep {
        if self.state.current.is_some() || self.state.outcome.is_some() {
            return CoreStep::idle();
        }
        dispatch_next_layer(&mut self.state)
    }

    /// Handle a single event and return the commands for the IO shell.
    pub fn step(&mut self, event: DriverEvent) -> CoreStep {
        if self.state.outcome.is_some() {
            return CoreStep::finished();
        }
        match event {
            DriverEvent::TaskFinished { key, task, outcome } => {
                handle_task_finished(&mut self.state, key, task, outcome)
            }
            DriverEvent::CancelRequested => handle_cancel(&mut self.state),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight.len()
    }

    pub fn current_layer(&self) -> Option<usize> {
        self.state.current
    }

    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.state.outcome.as_ref()
    }

    pub fn facts(&self) -> &FactBook {
        &self.state.facts
    }

    /// Plan as it stands, with write-backs applied.
    pub fn plan(&self) -> TaskPlan {
        TaskPlan::from(self.state.layers.clone())
    }

    pub fn into_report(self) -> JobReport {
        JobReport {
            // A driver stopped before finishing counts as cancelled.
            outcome: self.state.outcome.unwrap_or(JobOutcome::Cancelled),
            tasks: self.state.reports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CoreCommand, DispatchedTask, TaskOutcome};
    use crate::model::Task;
    use crate::types::{Provider, TaskAction, Target};
    use serde_json::json;

    fn task(action: TaskAction, node: &str, failure_allowed: bool) -> Task {
        Task {
            job_id: "j-1".to_string(),
            owner: "usr-1".to_string(),
            task_action: action,
            target: Target::Provider(Provider::QingCloud),
            node_id: node.to_string(),
            directive: json!({ "node_id": node }),
            failure_allowed,
            timeout: 0,
        }
    }

    fn plan(layers: Vec<Vec<Task>>) -> TaskPlan {
        TaskPlan::from(layers.into_iter().map(TaskLayer::new).collect::<Vec<_>>())
    }

    fn dispatched(step: &CoreStep) -> Vec<DispatchedTask> {
        step.commands
            .iter()
            .flat_map(|c| match c {
                CoreCommand::Dispatch(tasks) => tasks.clone(),
                _ => Vec::new(),
            })
            .collect()
    }

    fn finish(d: &DispatchedTask, outcome: TaskOutcome) -> DriverEvent {
        DriverEvent::TaskFinished {
            key: d.key,
            task: d.task.clone(),
            outcome,
        }
    }

    #[test]
    fn empty_plan_finishes_immediately() {
        let mut core = CoreDriver::new(TaskPlan::new());
        let step = core.start();
        assert!(!step.keep_running);
        assert_eq!(core.outcome(), Some(&JobOutcome::Succeeded));
    }

    #[test]
    fn next_layer_waits_for_the_whole_barrier() {
        let mut core = CoreDriver::new(plan(vec![
            vec![
                task(TaskAction::RunInstances, "a", false),
                task(TaskAction::RunInstances, "b", false),
            ],
            vec![task(TaskAction::StartConfd, "a", false)],
        ]));

        let first = dispatched(&core.start());
        assert_eq!(first.len(), 2);

        let step = core.step(finish(&first[0], TaskOutcome::Succeeded));
        assert!(dispatched(&step).is_empty());
        assert_eq!(core.current_layer(), Some(0));

        let step = core.step(finish(&first[1], TaskOutcome::Succeeded));
        let second = dispatched(&step);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].key, TaskKey { layer: 1, index: 0 });

        let step = core.step(finish(&second[0], TaskOutcome::Succeeded));
        assert!(!step.keep_running);
        assert_eq!(core.outcome(), Some(&JobOutcome::Succeeded));
    }

    #[test]
    fn allowed_failure_does_not_stop_the_plan() {
        let mut core = CoreDriver::new(plan(vec![
            vec![task(TaskAction::DeregisterCmd, "a", true)],
            vec![task(TaskAction::DeleteInstances, "a", false)],
        ]));
        let first = dispatched(&core.start());
        let step = core.step(finish(&first[0], TaskOutcome::Failed("gone".into())));
        assert_eq!(dispatched(&step).len(), 1);
    }

    #[test]
    fn hard_failure_drains_then_stops() {
        let mut core = CoreDriver::new(plan(vec![
            vec![
                task(TaskAction::RunInstances, "a", false),
                task(TaskAction::RunInstances, "b", false),
            ],
            vec![task(TaskAction::StartConfd, "a", false)],
        ]));
        let first = dispatched(&core.start());

        let step = core.step(finish(&first[0], TaskOutcome::Failed("quota".into())));
        assert!(step.keep_running);
        assert_eq!(core.in_flight(), 1);

        let step = core.step(finish(&first[1], TaskOutcome::Succeeded));
        assert!(dispatched(&step).is_empty());
        assert!(!step.keep_running);
        assert!(matches!(
            core.outcome(),
            Some(JobOutcome::Failed { node_id, error, .. }) if node_id == "a" && error == "quota"
        ));
    }

    #[test]
    fn cancel_waits_for_in_flight_tasks() {
        let mut core = CoreDriver::new(plan(vec![
            vec![task(TaskAction::RunInstances, "a", false)],
            vec![task(TaskAction::StartConfd, "a", false)],
        ]));
        let first = dispatched(&core.start());

        let step = core.step(DriverEvent::CancelRequested);
        assert!(step.commands.iter().any(|c| matches!(c, CoreCommand::Cancel)));
        assert!(step.keep_running);

        let step = core.step(finish(&first[0], TaskOutcome::Failed("cancelled".into())));
        assert!(!step.keep_running);
        assert_eq!(core.outcome(), Some(&JobOutcome::Cancelled));
    }

    #[test]
    fn write_backs_reach_later_layers() {
        let mut core = CoreDriver::new(plan(vec![
            vec![task(TaskAction::RunInstances, "a", false)],
            vec![task(TaskAction::StopInstances, "a", false)],
        ]));
        let first = dispatched(&core.start());

        let mut ran = first[0].task.clone();
        ran.directive = json!({ "node_id": "a", "instance_id": "i-1" });
        let step = core.step(DriverEvent::TaskFinished {
            key: first[0].key,
            task: ran,
            outcome: TaskOutcome::Succeeded,
        });
        let second = dispatched(&step);
        assert_eq!(second[0].task.directive["instance_id"], "i-1");
        assert_eq!(core.facts().get("a").unwrap().instance_id, "i-1");
    }
}
