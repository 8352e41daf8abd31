//! Task data model.
//!
//! Tasks are the atomic units of work routed to a worker role. Each task
//! belongs to exactly one routing plan and tracks its status, timing and
//! declared dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a task, unique within its plan.
///
/// Ids are short sequential strings (`task-1`, `task-2`, ...) so hosts and
/// humans can pass them back on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id for the `n`th (1-based) task of a decomposition.
    pub fn sequential(n: usize) -> Self {
        Self(format!("task-{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task status in its lifecycle.
///
/// Tasks only move forward: `Pending -> Executing -> {Completed, Failed}`,
/// or `Pending -> Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// Completed, failed or skipped.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// Pending or executing.
    pub fn is_unfinished(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Executing => write!(f, "executing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Estimated effort of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Moderate => write!(f, "moderate"),
            Complexity::Complex => write!(f, "complex"),
        }
    }
}

impl std::str::FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Complexity::Simple),
            "moderate" => Ok(Complexity::Moderate),
            "complex" => Ok(Complexity::Complex),
            other => Err(format!("unknown complexity: {}", other)),
        }
    }
}

/// A single unit of work routed to one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    /// Name of the role this task is routed to.
    pub role: String,
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    #[serde(default)]
    pub estimated_complexity: Complexity,
    #[serde(default)]
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Task {
    /// Create a pending task with no inputs, outputs or dependencies.
    pub fn new(id: TaskId, role: &str, description: &str) -> Self {
        Self {
            id,
            role: role.to_string(),
            description: description.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            depends_on: Vec::new(),
            estimated_complexity: Complexity::default(),
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.depends_on = deps;
        self
    }

    /// Put the task back into its initial state, dropping timing and error.
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error = None;
    }

    /// Transition to Executing and record the start time.
    pub fn start(&mut self) {
        self.status = TaskStatus::Executing;
        self.started_at = Some(Utc::now());
    }

    /// Transition to Completed. A task reported done without a start event
    /// gets its start time set to the completion time.
    pub fn complete(&mut self) {
        let now = Utc::now();
        self.status = TaskStatus::Completed;
        self.started_at.get_or_insert(now);
        self.completed_at = Some(now);
    }

    /// Transition to Failed with an error message.
    pub fn fail(&mut self, error: &str) {
        let now = Utc::now();
        self.status = TaskStatus::Failed;
        self.started_at.get_or_insert(now);
        self.completed_at = Some(now);
        self.error = Some(error.to_string());
    }

    /// Transition to Skipped.
    pub fn skip(&mut self) {
        self.status = TaskStatus::Skipped;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
