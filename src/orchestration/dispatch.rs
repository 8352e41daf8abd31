//! Role dispatch output and task outcome input.
//!
//! These are the shapes exchanged with whatever actually runs the work: the
//! engine hands out one `DispatchInstruction` per executable task and takes
//! back a `TaskOutcome` when the worker reports.

use serde::{Deserialize, Serialize};

use crate::core::{Role, RoleRegistry, Task, TaskId};
use crate::workflow::RoutingPlan;

/// One task handed to a worker role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchInstruction {
    pub task_id: TaskId,
    pub role: String,
    pub instruction_text: String,
    pub can_run_in_parallel: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// A worker's report for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TaskOutcome {
    pub fn success(task_id: TaskId) -> Self {
        Self {
            task_id,
            outcome: Outcome::Success,
            error_message: None,
        }
    }

    pub fn failure(task_id: TaskId, error: &str) -> Self {
        Self {
            task_id,
            outcome: Outcome::Failure,
            error_message: Some(error.to_string()),
        }
    }

    /// Error text recorded on the task for a failure report.
    pub fn error_text(&self) -> &str {
        self.error_message
            .as_deref()
            .unwrap_or("worker reported failure without a message")
    }
}

/// Build dispatch instructions for every task executable right now.
pub fn dispatch(plan: &RoutingPlan, registry: &RoleRegistry) -> Vec<DispatchInstruction> {
    plan.executable_tasks(registry)
        .into_iter()
        .map(|task| {
            let parallel = plan
                .locate(&task.id)
                .is_some_and(|(phase, _)| plan.phase_runs_parallel(phase));
            DispatchInstruction {
                task_id: task.id.clone(),
                role: task.role.clone(),
                instruction_text: instruction_text(task, registry.get(&task.role)),
                can_run_in_parallel: parallel,
            }
        })
        .collect()
}

fn instruction_text(task: &Task, role: Option<&Role>) -> String {
    let mut text = format!("[{}] {}\n", task.role, task.description);
    if let Some(role) = role {
        let ops: Vec<String> = role
            .allowed_operation_kinds
            .iter()
            .map(|k| k.to_string())
            .collect();
        text.push_str(&format!("Allowed operations: {}\n", ops.join(", ")));
    }
    if !task.inputs.is_empty() {
        text.push_str(&format!("Inputs: {}\n", task.inputs.join(", ")));
    }
    if !task.outputs.is_empty() {
        text.push_str(&format!("Expected outputs: {}\n", task.outputs.join(", ")));
    }
    text.push_str(&format!(
        "Complexity: {}\nReport the outcome for task {} when done.",
        task.estimated_complexity, task.id
    ));
    text
}
