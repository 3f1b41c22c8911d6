// src/plan/layer.rs

//! Barrier-ordered task layers.
//!
//! A [`TaskPlan`] is a sequence of [`TaskLayer`]s. Tasks inside one layer are
//! independent and may run concurrently; a layer may only start once every
//! task of the previous layer (including its wait) has finished.
//!
//! Stages that have nothing to do never show up in a plan: appending `None`
//! or an empty layer leaves the plan unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Task;
use crate::types::TaskAction;

/// One barrier tier of concurrently executable tasks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskLayer {
    pub tasks: Vec<Task>,
}

impl TaskLayer {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Wrap `tasks` into a layer, or `None` when there are none.
    pub fn non_empty(tasks: Vec<Task>) -> Option<Self> {
        if tasks.is_empty() {
            None
        } else {
            Some(Self { tasks })
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Action of the first task; builders only emit single-action layers.
    pub fn action(&self) -> Option<TaskAction> {
        self.tasks.first().map(|t| t.task_action)
    }
}

/// Ordered chain of task layers built for one job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskPlan {
    layers: Vec<TaskLayer>,
}

impl TaskPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single layer at the tail. `None` and empty layers are skipped.
    pub fn append(&mut self, layer: Option<TaskLayer>) -> &mut Self {
        if let Some(layer) = layer {
            if !layer.is_empty() {
                self.layers.push(layer);
            }
        }
        self
    }

    /// Append every layer of a sub-plan at the tail. `None` is skipped.
    pub fn append_plan(&mut self, plan: Option<TaskPlan>) -> &mut Self {
        if let Some(plan) = plan {
            for layer in plan.layers {
                self.append(Some(layer));
            }
        }
        self
    }

    /// Last layer of the chain, if any.
    pub fn leaf(&self) -> Option<&TaskLayer> {
        self.layers.last()
    }

    pub fn layers(&self) -> impl Iterator<Item = &TaskLayer> {
        self.layers.iter()
    }

    pub fn into_layers(self) -> Vec<TaskLayer> {
        self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.layers.iter().map(TaskLayer::len).sum()
    }

    /// `(action, task count)` per layer; the shape tests assert on.
    pub fn shape(&self) -> Vec<(TaskAction, usize)> {
        self.layers
            .iter()
            .filter_map(|l| l.action().map(|a| (a, l.len())))
            .collect()
    }

    /// `Some(self)` unless the plan is empty.
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() { None } else { Some(self) }
    }
}

impl From<Vec<TaskLayer>> for TaskPlan {
    fn from(layers: Vec<TaskLayer>) -> Self {
        let mut plan = TaskPlan::new();
        for layer in layers {
            plan.append(Some(layer));
        }
        plan
    }
}

impl fmt::Display for TaskPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, layer) in self.layers.iter().enumerate() {
            writeln!(f, "layer {idx}:")?;
            for task in &layer.tasks {
                write!(
                    f,
                    "  - {} -> {} (node {})",
                    task.task_action, task.target, task.node_id
                )?;
                if task.failure_allowed {
                    write!(f, " [failure allowed]")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Provider, Target};

    fn task(action: TaskAction, node: &str) -> Task {
        Task {
            job_id: "j-1".to_string(),
            owner: "usr".to_string(),
            task_action: action,
            target: Target::Provider(Provider::QingCloud),
            node_id: node.to_string(),
            directive: serde_json::Value::Null,
            failure_allowed: false,
            timeout: 0,
        }
    }

    #[test]
    fn appending_none_or_empty_is_a_no_op() {
        let mut plan = TaskPlan::new();
        plan.append(None)
            .append(Some(TaskLayer::default()))
            .append_plan(None)
            .append_plan(Some(TaskPlan::new()));
        assert!(plan.is_empty());
        assert!(plan.leaf().is_none());
    }

    #[test]
    fn append_attaches_at_the_tail() {
        let mut plan = TaskPlan::new();
        plan.append(TaskLayer::non_empty(vec![task(TaskAction::CreateVolumes, "a")]))
            .append(None)
            .append(TaskLayer::non_empty(vec![
                task(TaskAction::RunInstances, "a"),
                task(TaskAction::RunInstances, "b"),
            ]));

        assert_eq!(
            plan.shape(),
            vec![(TaskAction::CreateVolumes, 1), (TaskAction::RunInstances, 2)]
        );
        assert_eq!(plan.leaf().unwrap().action(), Some(TaskAction::RunInstances));
        assert_eq!(plan.task_count(), 3);
    }

    #[test]
    fn sub_plans_are_spliced_in_order() {
        let sub = TaskPlan::from(vec![
            TaskLayer::new(vec![task(TaskAction::StartConfd, "a")]),
            TaskLayer::new(vec![task(TaskAction::RegisterCmd, "a")]),
        ]);
        let mut plan = TaskPlan::new();
        plan.append(TaskLayer::non_empty(vec![task(TaskAction::RunInstances, "a")]))
            .append_plan(Some(sub));
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.leaf().unwrap().action(), Some(TaskAction::RegisterCmd));
    }
}
