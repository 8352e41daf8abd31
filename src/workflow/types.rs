//! Routing plan type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::core::{Task, TaskId};

/// Unique identifier for a routing plan.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PlanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Status of a plan in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Plan created, no task started yet
    #[default]
    Pending,
    /// At least one task has started
    InProgress,
    /// Every task resolved
    Completed,
    /// Retries exhausted, escalated to a human
    Failed,
    /// Cancelled by the host
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Pending => write!(f, "pending"),
            PlanStatus::InProgress => write!(f, "in_progress"),
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Failed => write!(f, "failed"),
            PlanStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Execution-order hint across phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    #[default]
    Sequential,
    Parallel,
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStrategy::Sequential => write!(f, "sequential"),
            ExecutionStrategy::Parallel => write!(f, "parallel"),
        }
    }
}

/// An ordered group of tasks whose dependencies all lie in earlier phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub index: usize,
    /// A non-parallel phase runs at most one task at a time.
    pub parallel: bool,
    pub tasks: Vec<Task>,
}

impl Phase {
    pub fn new(index: usize, parallel: bool, tasks: Vec<Task>) -> Self {
        Self {
            index,
            parallel,
            tasks,
        }
    }

    /// Every task is completed, failed or skipped.
    pub fn is_resolved(&self) -> bool {
        self.tasks.iter().all(|t| t.is_finished())
    }
}

/// The persisted execution state of one decomposed request.
///
/// Only the plan store mutates a live plan; everything else works on
/// snapshots returned by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingPlan {
    pub plan_id: PlanId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub original_request: String,
    pub status: PlanStatus,
    pub strategy: ExecutionStrategy,
    pub phases: Vec<Phase>,
    pub total_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub max_retries: u32,
    pub current_retry: u32,
    /// `TaskId -> (phase index, position within phase)`, rebuilt on creation
    /// and after every load.
    #[serde(skip)]
    pub(crate) task_index: HashMap<TaskId, (usize, usize)>,
}

/// Result of `increment_retry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryState {
    pub can_retry: bool,
    pub current_retry: u32,
    pub max_retries: u32,
}

/// Read-only projection of a plan for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub plan_id: PlanId,
    pub status: PlanStatus,
    pub strategy: ExecutionStrategy,
    pub phase_count: usize,
    /// Index of the earliest phase with unfinished tasks.
    pub current_phase: Option<usize>,
    pub total_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub executing_count: usize,
    pub pending_count: usize,
    /// Resolved (completed or skipped) tasks over total, in `0.0..=1.0`.
    pub progress: f64,
    pub current_retry: u32,
    pub max_retries: u32,
    pub can_retry: bool,
}

impl PlanSummary {
    /// `"resolved/total"` for human-readable output.
    pub fn progress_fraction(&self) -> String {
        format!(
            "{}/{}",
            self.completed_count + self.skipped_count,
            self.total_count
        )
    }
}
