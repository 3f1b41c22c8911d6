#![allow(dead_code)]

pub use pitrix_test_utils::builders;
pub use pitrix_test_utils::init_tracing;

use pitrix::plan::TaskPlan;
use pitrix::types::TaskAction;

/// Node ids of the layer at `idx`, in plan order.
pub fn layer_nodes(plan: &TaskPlan, idx: usize) -> Vec<String> {
    plan.layers()
        .nth(idx)
        .map(|l| l.tasks.iter().map(|t| t.node_id.clone()).collect())
        .unwrap_or_default()
}

/// Failure-allowed flag of the first layer running `action`.
pub fn failure_allowed_of(plan: &TaskPlan, action: TaskAction) -> Option<bool> {
    plan.layers()
        .find(|l| l.action() == Some(action))
        .map(|l| l.tasks.iter().all(|t| t.failure_allowed))
}
