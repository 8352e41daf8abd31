//! State transitions and read projections on a `RoutingPlan` value.
//!
//! Everything here is a pure function of the plan it is called on. The plan
//! store wraps these in locked load-mutate-save cycles; nothing in this module
//! touches storage.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

use crate::core::{RoleRegistry, Task, TaskId, TaskStatus};

use super::types::{
    ExecutionStrategy, Phase, PlanId, PlanStatus, PlanSummary, RetryState, RoutingPlan,
};

/// What a task transition did to the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The task moved to the requested status.
    Applied,
    /// The task was already in the requested status; nothing changed.
    AlreadyInState,
    /// No task with that id exists in the plan.
    UnknownTask,
    /// The task's current status does not allow the move.
    Rejected { from: TaskStatus },
    /// The plan is completed, failed or cancelled.
    PlanClosed,
}

impl Transition {
    pub fn is_applied(self) -> bool {
        self == Transition::Applied
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Applied => write!(f, "applied"),
            Transition::AlreadyInState => write!(f, "already in state"),
            Transition::UnknownTask => write!(f, "unknown task"),
            Transition::Rejected { from } => write!(f, "rejected from {}", from),
            Transition::PlanClosed => write!(f, "plan closed"),
        }
    }
}

impl RoutingPlan {
    /// Build a fresh plan over scheduled phases.
    ///
    /// Every task is reset to pending and the task index is built. The
    /// strategy is `Parallel` when any phase runs more than one task at once.
    pub fn new(phases: Vec<Phase>, original_request: &str, max_retries: u32) -> Self {
        let mut phases = phases;
        for (index, phase) in phases.iter_mut().enumerate() {
            phase.index = index;
            for task in &mut phase.tasks {
                task.reset();
            }
        }
        let strategy = if phases.iter().any(|p| p.parallel) {
            ExecutionStrategy::Parallel
        } else {
            ExecutionStrategy::Sequential
        };
        let total_count = phases.iter().map(|p| p.tasks.len()).sum();
        let now = Utc::now();

        let mut plan = Self {
            plan_id: PlanId::new(),
            created_at: now,
            updated_at: now,
            original_request: original_request.to_string(),
            status: PlanStatus::Pending,
            strategy,
            phases,
            total_count,
            completed_count: 0,
            failed_count: 0,
            max_retries,
            current_retry: 0,
            task_index: HashMap::new(),
        };
        plan.rebuild_index();
        plan
    }

    /// Set the execution strategy. `Sequential` also marks every phase as
    /// non-parallel, so the phases never claim more than the plan allows.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        if strategy == ExecutionStrategy::Sequential {
            for phase in &mut self.phases {
                phase.parallel = false;
            }
        }
        self
    }

    /// Rebuild the `TaskId -> (phase, position)` lookup from the phases.
    pub fn rebuild_index(&mut self) {
        self.task_index = self
            .phases
            .iter()
            .enumerate()
            .flat_map(|(pi, phase)| {
                phase
                    .tasks
                    .iter()
                    .enumerate()
                    .map(move |(ti, task)| (task.id.clone(), (pi, ti)))
            })
            .collect();
    }

    /// Position of a task as `(phase index, index within phase)`.
    pub fn locate(&self, id: &TaskId) -> Option<(usize, usize)> {
        self.task_index.get(id).copied()
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        let (pi, ti) = self.locate(id)?;
        self.phases
            .get(pi)
            .and_then(|p| p.tasks.get(ti))
            .filter(|t| t.id == *id)
    }

    fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        let (pi, ti) = self.locate(id)?;
        self.phases
            .get_mut(pi)
            .and_then(|p| p.tasks.get_mut(ti))
            .filter(|t| t.id == *id)
    }

    /// All tasks in phase order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.phases.iter().flat_map(|p| p.tasks.iter())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn count_status(&self, status: TaskStatus) -> usize {
        self.tasks().filter(|t| t.status == status).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.count_status(TaskStatus::Skipped)
    }

    /// Completed plus skipped tasks.
    pub fn resolved_count(&self) -> usize {
        self.completed_count + self.skipped_count()
    }

    /// Fraction of resolved tasks. An empty plan counts as fully resolved.
    pub fn progress(&self) -> f64 {
        if self.total_count == 0 {
            return 1.0;
        }
        self.resolved_count() as f64 / self.total_count as f64
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn complete_if_resolved(&mut self) {
        if self.resolved_count() >= self.total_count {
            self.status = PlanStatus::Completed;
        }
    }

    /// `pending -> executing`. The first start moves the plan to in progress.
    pub fn start_task(&mut self, id: &TaskId) -> Transition {
        if self.is_terminal() {
            return Transition::PlanClosed;
        }
        let Some(task) = self.task_mut(id) else {
            return Transition::UnknownTask;
        };
        match task.status {
            TaskStatus::Pending => task.start(),
            TaskStatus::Executing => return Transition::AlreadyInState,
            from => return Transition::Rejected { from },
        }
        if self.status == PlanStatus::Pending {
            self.status = PlanStatus::InProgress;
        }
        self.touch();
        Transition::Applied
    }

    /// `executing -> completed`. A pending task is started implicitly first,
    /// for hosts that only report outcomes. Completing twice counts once.
    pub fn complete_task(&mut self, id: &TaskId) -> Transition {
        if self.is_terminal() {
            return Transition::PlanClosed;
        }
        let Some(task) = self.task_mut(id) else {
            return Transition::UnknownTask;
        };
        match task.status {
            TaskStatus::Pending => {
                task.start();
                task.complete();
            }
            TaskStatus::Executing => task.complete(),
            TaskStatus::Completed => return Transition::AlreadyInState,
            from => return Transition::Rejected { from },
        }
        self.completed_count += 1;
        if self.status == PlanStatus::Pending {
            self.status = PlanStatus::InProgress;
        }
        self.complete_if_resolved();
        self.touch();
        Transition::Applied
    }

    /// `executing -> failed`, with the same implicit start as
    /// [`complete_task`](Self::complete_task). Never fails the plan itself;
    /// that decision belongs to the completion driver.
    pub fn fail_task(&mut self, id: &TaskId, error: &str) -> Transition {
        if self.is_terminal() {
            return Transition::PlanClosed;
        }
        let Some(task) = self.task_mut(id) else {
            return Transition::UnknownTask;
        };
        match task.status {
            TaskStatus::Pending => {
                task.start();
                task.fail(error);
            }
            TaskStatus::Executing => task.fail(error),
            TaskStatus::Failed => return Transition::AlreadyInState,
            from => return Transition::Rejected { from },
        }
        self.failed_count += 1;
        if self.status == PlanStatus::Pending {
            self.status = PlanStatus::InProgress;
        }
        self.touch();
        Transition::Applied
    }

    /// `pending -> skipped`. Skipped tasks count as resolved.
    pub fn skip_task(&mut self, id: &TaskId) -> Transition {
        if self.is_terminal() {
            return Transition::PlanClosed;
        }
        let Some(task) = self.task_mut(id) else {
            return Transition::UnknownTask;
        };
        match task.status {
            TaskStatus::Pending => task.skip(),
            TaskStatus::Skipped => return Transition::AlreadyInState,
            from => return Transition::Rejected { from },
        }
        self.complete_if_resolved();
        self.touch();
        Transition::Applied
    }

    /// Index of the earliest phase with a pending or executing task.
    pub fn current_phase(&self) -> Option<usize> {
        self.phases.iter().position(|p| !p.is_resolved())
    }

    /// Whether tasks of the given phase may run side by side. Decided by the
    /// phase alone; the plan strategy is a hint across phases.
    pub fn phase_runs_parallel(&self, phase: usize) -> bool {
        self.phases.get(phase).is_some_and(|p| p.parallel)
    }

    /// Tasks eligible right now given phase ordering.
    ///
    /// Only the earliest unfinished phase contributes. A parallel phase
    /// yields all its unfinished tasks; any other phase yields only its first
    /// unfinished task, so at most one of its tasks is ever in flight.
    pub fn pending_tasks(&self) -> Vec<&Task> {
        if self.is_terminal() {
            return Vec::new();
        }
        let Some(current) = self.current_phase() else {
            return Vec::new();
        };
        let mut unfinished = self.phases[current]
            .tasks
            .iter()
            .filter(|t| t.status.is_unfinished());
        if self.phase_runs_parallel(current) {
            unfinished.collect()
        } else {
            unfinished.next().into_iter().collect()
        }
    }

    /// Pending tasks that can be handed to a worker now.
    ///
    /// A task qualifies when it is still pending, every dependency is
    /// completed, and its role has fewer than `concurrency_limit` tasks
    /// executing across the whole plan.
    pub fn executable_tasks(&self, registry: &RoleRegistry) -> Vec<&Task> {
        let completed: HashSet<&TaskId> = self
            .tasks()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| &t.id)
            .collect();
        let mut executing: HashMap<&str, u32> = HashMap::new();
        for task in self.tasks().filter(|t| t.status == TaskStatus::Executing) {
            *executing.entry(task.role.as_str()).or_default() += 1;
        }

        let mut admitted = Vec::new();
        for task in self.pending_tasks() {
            if task.status != TaskStatus::Pending {
                continue;
            }
            if !task.depends_on.iter().all(|d| completed.contains(d)) {
                continue;
            }
            let running = executing.entry(task.role.as_str()).or_default();
            if *running >= registry.concurrency_limit(&task.role) {
                continue;
            }
            *running += 1;
            admitted.push(task);
        }
        admitted
    }

    /// Tasks executing since before `now - threshold`.
    pub fn stalled_tasks(&self, threshold: Duration, now: DateTime<Utc>) -> Vec<&Task> {
        self.tasks()
            .filter(|t| t.status == TaskStatus::Executing)
            .filter(|t| t.started_at.is_some_and(|s| now - s > threshold))
            .collect()
    }

    pub fn retry_state(&self) -> RetryState {
        RetryState {
            can_retry: self.current_retry < self.max_retries,
            current_retry: self.current_retry,
            max_retries: self.max_retries,
        }
    }

    /// Bump the retry counter. `can_retry` in the result reflects the
    /// counter after the increment.
    pub fn increment_retry(&mut self) -> RetryState {
        self.current_retry = self.current_retry.saturating_add(1);
        self.touch();
        self.retry_state()
    }

    /// Move to `completed` unless already terminal.
    pub fn finish(&mut self) -> bool {
        self.close(PlanStatus::Completed)
    }

    /// Move to `failed` unless already terminal.
    pub fn escalate(&mut self) -> bool {
        self.close(PlanStatus::Failed)
    }

    /// Move to `cancelled` unless already terminal.
    pub fn cancel(&mut self) -> bool {
        self.close(PlanStatus::Cancelled)
    }

    fn close(&mut self, status: PlanStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = status;
        self.touch();
        true
    }

    pub fn summary(&self) -> PlanSummary {
        let retry = self.retry_state();
        PlanSummary {
            plan_id: self.plan_id,
            status: self.status,
            strategy: self.strategy,
            phase_count: self.phases.len(),
            current_phase: self.current_phase(),
            total_count: self.total_count,
            completed_count: self.completed_count,
            failed_count: self.failed_count,
            skipped_count: self.skipped_count(),
            executing_count: self.count_status(TaskStatus::Executing),
            pending_count: self.count_status(TaskStatus::Pending),
            progress: self.progress(),
            current_retry: retry.current_retry,
            max_retries: retry.max_retries,
            can_retry: retry.can_retry,
        }
    }
}
