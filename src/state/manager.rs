//! The plan store: the only owner of live routing plans.
//!
//! Every change takes the store mutex and the backend's workspace lock,
//! loads the document, applies one change and saves before releasing. The
//! mutex orders threads sharing a store; the workspace lock orders separate
//! stores and processes on the same state directory. Callers only ever see
//! snapshots.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::config::{Config, DEFAULT_MAX_RETRIES};
use crate::core::{RoleRegistry, Task, TaskId};
use crate::orchestration::dispatch::{self, DispatchInstruction, Outcome, TaskOutcome};
use crate::workflow::{
    ExecutionStrategy, Phase, PlanId, PlanSummary, RetryState, RoutingPlan, Transition,
};
use crate::{clog, clog_debug, clog_error, clog_warn, Error, Result};

use super::backend::{JsonFileBackend, MemoryBackend, PlanBackend};
use super::migration::PlanDocument;

/// Outcome of a task transition plus the plan it left behind.
#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub transition: Transition,
    pub plan: RoutingPlan,
}

pub struct PlanStore {
    backend: Mutex<Box<dyn PlanBackend>>,
    max_retries: u32,
    sequential: bool,
}

impl PlanStore {
    pub fn new(backend: impl PlanBackend + 'static) -> Self {
        Self {
            backend: Mutex::new(Box::new(backend)),
            max_retries: DEFAULT_MAX_RETRIES,
            sequential: false,
        }
    }

    pub fn in_memory(workspace: &str) -> Self {
        Self::new(MemoryBackend::new(workspace))
    }

    /// File-backed store for `workspace`, configured from `config`.
    pub fn open(workspace: &Path, config: &Config) -> Result<Self> {
        let dir = config.state_dir_for(workspace);
        let key = workspace.to_string_lossy().to_string();
        clog_debug!("PlanStore::open workspace={} dir={}", key, dir.display());
        Ok(Self::new(JsonFileBackend::new(&dir, &key))
            .with_max_retries(config.max_retries)
            .with_sequential(config.sequential))
    }

    /// Retry budget given to newly created plans.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Create every new plan with the sequential strategy.
    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    fn backend(&self) -> Result<MutexGuard<'_, Box<dyn PlanBackend>>> {
        self.backend.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Run `f` holding both the mutex and the workspace lock.
    fn critical<T>(&self, f: impl FnOnce(&mut dyn PlanBackend) -> Result<T>) -> Result<T> {
        let mut backend = self.backend()?;
        let _workspace = backend.lock()?;
        f(&mut **backend)
    }

    /// Save `plan` back, moving it to the archive if it reached a terminal
    /// status.
    fn commit(
        backend: &mut dyn PlanBackend,
        mut doc: PlanDocument,
        plan: &RoutingPlan,
    ) -> Result<()> {
        if plan.is_terminal() {
            backend.archive(plan)?;
            doc.plan = None;
            clog!(
                "Plan {} closed as {}, archived",
                plan.plan_id.short(),
                plan.status
            );
        } else {
            doc.plan = Some(plan.clone());
        }
        backend.save(&doc).inspect_err(|e| {
            clog_error!("Failed to save plan {}: {}", plan.plan_id.short(), e);
        })
    }

    /// Lock, load, let `f` change the active plan, save when `f` reports a
    /// change. `None` when there is no active plan.
    fn modify<T>(
        &self,
        f: impl FnOnce(&mut RoutingPlan) -> (T, bool),
    ) -> Result<Option<(T, RoutingPlan)>> {
        self.critical(|backend| {
            let mut doc = backend.load()?;
            let Some(mut plan) = doc.plan.take() else {
                return Ok(None);
            };
            plan.rebuild_index();
            let (out, changed) = f(&mut plan);
            if changed {
                Self::commit(backend, doc, &plan)?;
            }
            Ok(Some((out, plan)))
        })
    }

    /// Apply `f` to the active plan inside the store's critical section
    /// and persist the result.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&mut RoutingPlan) -> T,
    ) -> Result<Option<(T, RoutingPlan)>> {
        self.modify(|plan| (f(plan), true))
    }

    fn read<T>(&self, f: impl FnOnce(&RoutingPlan) -> T) -> Result<Option<T>> {
        let mut backend = self.backend()?;
        let doc = backend.load()?;
        Ok(doc.plan.map(|mut plan| {
            plan.rebuild_index();
            f(&plan)
        }))
    }

    fn transition(
        &self,
        op: &str,
        id: &TaskId,
        f: impl FnOnce(&mut RoutingPlan) -> Transition,
    ) -> Result<Option<TaskUpdate>> {
        let result = self.modify(|plan| {
            let transition = f(plan);
            (transition, transition.is_applied())
        })?;
        match result {
            None => {
                clog_debug!("{} {}: no active plan", op, id);
                Ok(None)
            }
            Some((transition, plan)) => {
                match transition {
                    Transition::Applied => clog_debug!("{} {}: applied", op, id),
                    Transition::UnknownTask => clog_warn!("{} {}: unknown task", op, id),
                    other => clog_debug!("{} {}: {}", op, id, other),
                }
                Ok(Some(TaskUpdate { transition, plan }))
            }
        }
    }

    /// The active plan, if any.
    pub fn load(&self) -> Result<Option<RoutingPlan>> {
        self.read(|plan| plan.clone())
    }

    /// Create a fresh plan over `phases` and make it the active one.
    ///
    /// An unfinished plan already in the slot is archived as cancelled.
    pub fn create_plan(&self, phases: Vec<Phase>, original_request: &str) -> Result<RoutingPlan> {
        self.critical(|backend| {
            let doc = backend.load()?;
            self.replace(backend, doc, phases, original_request)
        })
    }

    fn replace(
        &self,
        backend: &mut dyn PlanBackend,
        mut doc: PlanDocument,
        phases: Vec<Phase>,
        original_request: &str,
    ) -> Result<RoutingPlan> {
        if let Some(mut previous) = doc.plan.take() {
            if previous.cancel() {
                clog_warn!(
                    "Replacing active plan {}, archiving it as cancelled",
                    previous.plan_id.short()
                );
            }
            backend.archive(&previous)?;
        }

        let mut plan = RoutingPlan::new(phases, original_request, self.max_retries);
        if self.sequential {
            plan = plan.with_strategy(ExecutionStrategy::Sequential);
        }
        doc.workspace = backend.workspace().to_string();
        doc.plan = Some(plan.clone());
        backend.save(&doc)?;
        clog!(
            "Created plan {} with {} tasks in {} phases ({})",
            plan.plan_id.short(),
            plan.total_count,
            plan.phases.len(),
            plan.strategy
        );
        Ok(plan)
    }

    pub fn mark_task_started(&self, id: &TaskId) -> Result<Option<TaskUpdate>> {
        self.transition("start", id, |plan| plan.start_task(id))
    }

    pub fn mark_task_completed(&self, id: &TaskId) -> Result<Option<TaskUpdate>> {
        self.transition("complete", id, |plan| plan.complete_task(id))
    }

    pub fn mark_task_failed(&self, id: &TaskId, error: &str) -> Result<Option<TaskUpdate>> {
        self.transition("fail", id, |plan| plan.fail_task(id, error))
    }

    pub fn mark_task_skipped(&self, id: &TaskId) -> Result<Option<TaskUpdate>> {
        self.transition("skip", id, |plan| plan.skip_task(id))
    }

    /// Map a worker report onto complete or fail.
    pub fn apply_outcome(&self, outcome: &TaskOutcome) -> Result<Option<TaskUpdate>> {
        match outcome.outcome {
            Outcome::Success => self.mark_task_completed(&outcome.task_id),
            Outcome::Failure => self.mark_task_failed(&outcome.task_id, outcome.error_text()),
        }
    }

    pub fn pending_tasks(&self) -> Result<Vec<Task>> {
        let tasks = self.read(|plan| plan.pending_tasks().into_iter().cloned().collect())?;
        Ok(tasks.unwrap_or_default())
    }

    pub fn executable_tasks(&self, registry: &RoleRegistry) -> Result<Vec<Task>> {
        let tasks = self.read(|plan| {
            plan.executable_tasks(registry)
                .into_iter()
                .cloned()
                .collect()
        })?;
        Ok(tasks.unwrap_or_default())
    }

    pub fn dispatch(&self, registry: &RoleRegistry) -> Result<Vec<DispatchInstruction>> {
        let out = self.read(|plan| dispatch::dispatch(plan, registry))?;
        Ok(out.unwrap_or_default())
    }

    pub fn increment_retry(&self) -> Result<Option<RetryState>> {
        Ok(self.update(|plan| plan.increment_retry())?.map(|(r, _)| r))
    }

    pub fn summary(&self) -> Result<Option<PlanSummary>> {
        self.read(|plan| plan.summary())
    }

    /// Cancel the active plan. Pending-task queries are empty from here on.
    pub fn cancel_plan(&self) -> Result<Option<RoutingPlan>> {
        let result = self.modify(|plan| ((), plan.cancel()))?;
        Ok(result.map(|(_, plan)| plan))
    }

    /// Drop the active plan without archiving it.
    pub fn clear_plan(&self) -> Result<Option<RoutingPlan>> {
        self.critical(|backend| {
            let doc = backend.load()?;
            backend.clear()?;
            if let Some(plan) = &doc.plan {
                clog!("Cleared plan {}", plan.plan_id.short());
            }
            Ok(doc.plan)
        })
    }

    /// Replace the active plan with a fresh one built from its original
    /// request. The old plan is archived as cancelled. Reading the old plan
    /// and writing the new one happen under one lock.
    pub fn reset_plan(
        &self,
        phases_for: impl FnOnce(&str) -> Vec<Phase>,
    ) -> Result<Option<RoutingPlan>> {
        self.critical(|backend| {
            let doc = backend.load()?;
            let Some(current) = doc.plan.clone() else {
                return Ok(None);
            };
            let phases = phases_for(&current.original_request);
            let plan = self.replace(backend, doc, phases, &current.original_request)?;
            clog!(
                "Reset plan {} as {}",
                current.plan_id.short(),
                plan.plan_id.short()
            );
            Ok(Some(plan))
        })
    }

    /// A plan that has left the active slot.
    pub fn archived(&self, id: &PlanId) -> Result<Option<RoutingPlan>> {
        self.backend()?.load_archived(id)
    }
}
