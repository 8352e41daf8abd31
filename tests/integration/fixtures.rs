//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Building stores in temporary workspaces
//! - Planning requests through the full pipeline
//! - Hand-built task sets

use std::collections::BTreeMap;
use tempfile::TempDir;

use conductor::config::Config;
use conductor::core::{RoleRegistry, Task, TaskId};
use conductor::orchestration::{PhaseScheduler, Planner};
use conductor::workflow::{Phase, RoutingPlan};
use conductor::PlanStore;

/// A file-backed store rooted in a temporary workspace.
pub struct TestWorkspace {
    pub temp_dir: TempDir,
    pub config: Config,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self { temp_dir, config }
    }

    /// Open a fresh store handle on the workspace.
    pub fn store(&self) -> PlanStore {
        PlanStore::open(self.temp_dir.path(), &self.config).expect("Failed to open store")
    }

    pub fn registry(&self) -> RoleRegistry {
        self.config.role_registry()
    }

    pub fn plan_path(&self) -> std::path::PathBuf {
        self.config.state_dir_for(self.temp_dir.path()).join("plan.json")
    }
}

/// Run `request` through the planner and make it the active plan.
pub fn plan_request(store: &PlanStore, registry: &RoleRegistry, request: &str) -> RoutingPlan {
    let draft = Planner::new(registry).draft(request, None);
    store
        .create_plan(draft.into_phases(), request)
        .expect("Failed to create plan")
}

/// Complete every dispatchable task until nothing is left to dispatch.
/// Returns the ids in the order they were completed.
pub fn complete_everything(store: &PlanStore, registry: &RoleRegistry) -> Vec<TaskId> {
    let mut order = Vec::new();
    loop {
        let ready = store.executable_tasks(registry).expect("executable_tasks");
        if ready.is_empty() {
            return order;
        }
        for task in ready {
            store.mark_task_started(&task.id).expect("start");
            store.mark_task_completed(&task.id).expect("complete");
            order.push(task.id);
        }
    }
}

/// Create a task with the given dependencies.
pub fn test_task(id: &str, role: &str, deps: &[&str]) -> Task {
    Task::new(TaskId::new(id), role, &format!("Task {}", id))
        .with_dependencies(deps.iter().map(|d| TaskId::new(*d)).collect())
}

/// Schedule hand-built tasks with the built-in registry.
pub fn schedule(registry: &RoleRegistry, tasks: &[Task]) -> Vec<Phase> {
    PhaseScheduler::new(registry).schedule(tasks).into_phases()
}

/// Built-in registry with one role's concurrency limit replaced.
pub fn registry_with_limit(role: &str, limit: u32) -> RoleRegistry {
    let mut overrides = BTreeMap::new();
    overrides.insert(role.to_string(), limit);
    RoleRegistry::builtin().with_limit_overrides(&overrides)
}
