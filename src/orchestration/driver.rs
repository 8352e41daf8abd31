//! Completion/escalation driver.
//!
//! Run on every host checkpoint. The driver only reads plan projections and
//! applies the three plan-level decisions (complete, retry, escalate); it
//! never schedules anything itself. When evaluated through a `PlanStore` the
//! whole decision runs inside the store's critical section.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::config::{Config, DEFAULT_CONTINUATION_LIMIT, DEFAULT_STALL_THRESHOLD_SECS};
use crate::core::{Task, TaskId, TaskStatus};
use crate::state::PlanStore;
use crate::workflow::{PlanId, PlanStatus, RetryState, RoutingPlan};
use crate::{clog, clog_warn, Result};

const MANUAL_INTERVENTION: &str = "Manual intervention required: inspect the unfinished tasks \
    listed above, then resolve them by hand or reset the plan.";

/// A task as it appears in directives and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLine {
    pub task_id: TaskId,
    pub role: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Task> for TaskLine {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            role: task.role.clone(),
            description: task.description.clone(),
            status: task.status,
            error: task.error.clone(),
        }
    }
}

impl fmt::Display for TaskLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} ({})",
            self.task_id, self.role, self.description, self.status
        )?;
        if let Some(error) = &self.error {
            write!(f, ": {}", error)?;
        }
        Ok(())
    }
}

fn lines<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Vec<TaskLine> {
    tasks.into_iter().map(TaskLine::from).collect()
}

fn write_section(f: &mut fmt::Formatter<'_>, title: &str, items: &[TaskLine]) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(f, "{}:", title)?;
    for item in items {
        writeln!(f, "  - {}", item)?;
    }
    Ok(())
}

/// The plan finished with no pending tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub plan_id: PlanId,
    pub progress: String,
    /// Failed tasks the plan finished with.
    pub failed: Vec<TaskLine>,
}

impl fmt::Display for CompletionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Plan {} completed ({} tasks resolved).",
            self.plan_id, self.progress
        )?;
        write_section(f, "Finished with failures", &self.failed)
    }
}

/// Work remains and retries are left: keep going.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationDirective {
    pub plan_id: PlanId,
    pub progress: String,
    pub retry: RetryState,
    /// The first pending tasks, up to the continuation limit.
    pub tasks: Vec<TaskLine>,
    /// Pending tasks not listed.
    pub remaining: usize,
    pub stalled: Vec<TaskLine>,
}

impl fmt::Display for ContinuationDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Plan {} in progress ({} tasks resolved), continuation {}/{}.",
            self.plan_id, self.progress, self.retry.current_retry, self.retry.max_retries
        )?;
        write_section(f, "Continue with", &self.tasks)?;
        if self.remaining > 0 {
            writeln!(f, "  ... and {} more", self.remaining)?;
        }
        write_section(f, "Stalled", &self.stalled)
    }
}

/// Retries are exhausted with work remaining: hand off to a human.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationReport {
    pub plan_id: PlanId,
    pub progress: String,
    pub original_request: String,
    pub retry: RetryState,
    pub original_tasks: Vec<TaskLine>,
    pub pending_tasks: Vec<TaskLine>,
    pub failed: Vec<TaskLine>,
    pub stalled: Vec<TaskLine>,
    pub recommendation: String,
}

impl fmt::Display for EscalationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Plan {} escalated after {} of {} retries ({} tasks resolved).",
            self.plan_id, self.retry.current_retry, self.retry.max_retries, self.progress
        )?;
        writeln!(f, "Request: {}", self.original_request)?;
        write_section(f, "Original tasks", &self.original_tasks)?;
        write_section(f, "Still pending", &self.pending_tasks)?;
        write_section(f, "Failed", &self.failed)?;
        write_section(f, "Stalled", &self.stalled)?;
        writeln!(f, "{}", self.recommendation)
    }
}

/// Result of one checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evaluation {
    /// No active plan.
    Idle,
    Completed(CompletionReport),
    Continue(ContinuationDirective),
    Exhausted(EscalationReport),
}

impl Evaluation {
    /// Process exit code for hosts that only look at the status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Evaluation::Exhausted(_) => 2,
            _ => 0,
        }
    }

    /// The host can stop polling.
    pub fn is_final(&self) -> bool {
        !matches!(self, Evaluation::Continue(_))
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Idle => writeln!(f, "No active plan."),
            Evaluation::Completed(report) => write!(f, "{}", report),
            Evaluation::Continue(directive) => write!(f, "{}", directive),
            Evaluation::Exhausted(report) => write!(f, "{}", report),
        }
    }
}

/// Checkpoint evaluator.
#[derive(Debug, Clone)]
pub struct CompletionDriver {
    continuation_limit: usize,
    stall_threshold: Duration,
}

impl Default for CompletionDriver {
    fn default() -> Self {
        Self {
            continuation_limit: DEFAULT_CONTINUATION_LIMIT,
            stall_threshold: Duration::seconds(DEFAULT_STALL_THRESHOLD_SECS as i64),
        }
    }
}

impl CompletionDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_continuation_limit(config.continuation_limit)
            .with_stall_threshold(config.stall_threshold())
    }

    pub fn with_continuation_limit(mut self, limit: usize) -> Self {
        self.continuation_limit = limit.max(1);
        self
    }

    pub fn with_stall_threshold(mut self, threshold: std::time::Duration) -> Self {
        self.stall_threshold = Duration::from_std(threshold).unwrap_or(Duration::MAX);
        self
    }

    /// Evaluate the store's active plan in one critical section.
    pub fn evaluate(&self, store: &PlanStore) -> Result<Evaluation> {
        let evaluated = store.update(|plan| self.evaluate_plan(plan))?;
        Ok(evaluated.map(|(evaluation, _)| evaluation).unwrap_or(Evaluation::Idle))
    }

    /// Decide the next step for a plan, applying the decision to it.
    pub fn evaluate_plan(&self, plan: &mut RoutingPlan) -> Evaluation {
        match plan.status {
            PlanStatus::Cancelled => return Evaluation::Idle,
            PlanStatus::Failed => return Evaluation::Exhausted(self.escalation(plan)),
            PlanStatus::Completed => return Evaluation::Completed(self.completion(plan)),
            PlanStatus::Pending | PlanStatus::InProgress => {}
        }

        if plan.pending_tasks().is_empty() {
            plan.finish();
            let report = self.completion(plan);
            clog!(
                "driver: plan {} completed ({})",
                plan.plan_id.short(),
                report.progress
            );
            return Evaluation::Completed(report);
        }

        if plan.retry_state().can_retry {
            let retry = plan.increment_retry();
            let directive = self.continuation(plan, retry);
            clog!(
                "driver: plan {} continuation {}/{} with {} pending",
                plan.plan_id.short(),
                retry.current_retry,
                retry.max_retries,
                directive.tasks.len() + directive.remaining
            );
            return Evaluation::Continue(directive);
        }

        plan.escalate();
        let report = self.escalation(plan);
        clog_warn!(
            "driver: plan {} escalated with {} pending task(s)",
            plan.plan_id.short(),
            report.pending_tasks.len()
        );
        Evaluation::Exhausted(report)
    }

    fn progress(plan: &RoutingPlan) -> String {
        format!("{}/{}", plan.resolved_count(), plan.total_count)
    }

    fn failed(plan: &RoutingPlan) -> Vec<TaskLine> {
        lines(plan.tasks().filter(|t| t.status == TaskStatus::Failed))
    }

    fn stalled(&self, plan: &RoutingPlan) -> Vec<TaskLine> {
        lines(plan.stalled_tasks(self.stall_threshold, Utc::now()))
    }

    fn completion(&self, plan: &RoutingPlan) -> CompletionReport {
        CompletionReport {
            plan_id: plan.plan_id,
            progress: Self::progress(plan),
            failed: Self::failed(plan),
        }
    }

    fn continuation(&self, plan: &RoutingPlan, retry: RetryState) -> ContinuationDirective {
        let pending = plan.pending_tasks();
        let remaining = pending.len().saturating_sub(self.continuation_limit);
        ContinuationDirective {
            plan_id: plan.plan_id,
            progress: Self::progress(plan),
            retry,
            tasks: lines(pending.into_iter().take(self.continuation_limit)),
            remaining,
            stalled: self.stalled(plan),
        }
    }

    fn escalation(&self, plan: &RoutingPlan) -> EscalationReport {
        // A failed plan reports no pending tasks, so list what is unfinished.
        let pending = lines(plan.tasks().filter(|t| t.status.is_unfinished()));
        EscalationReport {
            plan_id: plan.plan_id,
            progress: Self::progress(plan),
            original_request: plan.original_request.clone(),
            retry: plan.retry_state(),
            original_tasks: lines(plan.tasks()),
            pending_tasks: pending,
            failed: Self::failed(plan),
            stalled: self.stalled(plan),
            recommendation: MANUAL_INTERVENTION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::role::{IMPLEMENTER, TESTER};
    use crate::workflow::Phase;

    fn plan(n: usize, max_retries: u32) -> RoutingPlan {
        let tasks = (1..=n)
            .map(|i| Task::new(TaskId::sequential(i), IMPLEMENTER, &format!("Build part {}", i)))
            .collect();
        RoutingPlan::new(vec![Phase::new(0, true, tasks)], "build parts", max_retries)
    }

    #[test]
    fn test_empty_pending_completes_plan() {
        let driver = CompletionDriver::new();
        let mut plan = plan(1, 3);
        plan.start_task(&TaskId::sequential(1));
        plan.fail_task(&TaskId::sequential(1), "boom");
        assert_eq!(plan.status, PlanStatus::InProgress);

        let eval = driver.evaluate_plan(&mut plan);
        assert_eq!(plan.status, PlanStatus::Completed);
        match eval {
            Evaluation::Completed(report) => {
                assert_eq!(report.progress, "0/1");
                assert_eq!(report.failed.len(), 1);
                assert!(report.to_string().contains("Finished with failures"));
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_continue_lists_up_to_limit() {
        let driver = CompletionDriver::new();
        let mut plan = plan(7, 3);
        let eval = driver.evaluate_plan(&mut plan);
        assert_eq!(plan.current_retry, 1);
        match &eval {
            Evaluation::Continue(directive) => {
                assert_eq!(directive.tasks.len(), DEFAULT_CONTINUATION_LIMIT);
                assert_eq!(directive.remaining, 2);
                assert_eq!(directive.retry.current_retry, 1);
                let text = directive.to_string();
                assert!(text.contains(&plan.plan_id.to_string()));
                assert!(text.contains("0/7"));
                assert!(text.contains("[implementer] Build part 1"));
                assert!(text.contains("and 2 more"));
            }
            other => panic!("expected continuation, got {:?}", other),
        }
        assert!(!eval.is_final());
        assert_eq!(eval.exit_code(), 0);
    }

    #[test]
    fn test_exhaustion_escalates() {
        let driver = CompletionDriver::new();
        let mut plan = plan(2, 3);
        plan.complete_task(&TaskId::sequential(1));
        for _ in 0..3 {
            assert!(matches!(driver.evaluate_plan(&mut plan), Evaluation::Continue(_)));
        }
        let eval = driver.evaluate_plan(&mut plan);
        assert_eq!(plan.status, PlanStatus::Failed);
        assert_eq!(eval.exit_code(), 2);
        match eval {
            Evaluation::Exhausted(report) => {
                assert_eq!(report.original_tasks.len(), 2);
                assert_eq!(report.pending_tasks.len(), 1);
                assert_eq!(report.pending_tasks[0].task_id, TaskId::sequential(2));
                assert!(report.to_string().contains("Manual intervention"));
                assert!(report.to_string().contains("1/2"));
            }
            other => panic!("expected escalation, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_retries_escalates_immediately() {
        let driver = CompletionDriver::new();
        let mut plan = plan(1, 0);
        assert!(matches!(
            driver.evaluate_plan(&mut plan),
            Evaluation::Exhausted(_)
        ));
    }

    #[test]
    fn test_stalled_tasks_reported() {
        let driver = CompletionDriver::new().with_stall_threshold(std::time::Duration::ZERO);
        let mut plan = plan(2, 3);
        plan.start_task(&TaskId::sequential(1));
        if let Some(task) = plan.phases[0].tasks.first_mut() {
            task.started_at = Some(Utc::now() - Duration::seconds(5));
        }
        match driver.evaluate_plan(&mut plan) {
            Evaluation::Continue(directive) => {
                assert_eq!(directive.stalled.len(), 1);
                assert!(directive.to_string().contains("Stalled"));
            }
            other => panic!("expected continuation, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_plan_is_idle() {
        let driver = CompletionDriver::new();
        let mut plan = plan(1, 3);
        plan.cancel();
        assert_eq!(driver.evaluate_plan(&mut plan), Evaluation::Idle);
    }

    #[test]
    fn test_evaluation_serializes_with_kind_tag() {
        let driver = CompletionDriver::new();
        let mut plan = RoutingPlan::new(
            vec![Phase::new(
                0,
                false,
                vec![Task::new(TaskId::sequential(1), TESTER, "Run tests")],
            )],
            "test",
            3,
        );
        let value = serde_json::to_value(driver.evaluate_plan(&mut plan)).unwrap();
        assert_eq!(value["kind"], "continue");
        assert_eq!(value["tasks"][0]["role"], "tester");
    }
}
