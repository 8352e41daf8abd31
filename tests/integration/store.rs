//! Plan store persistence and concurrency tests.

use std::sync::Arc;
use std::thread;

use conductor::config::Config;
use conductor::core::role::IMPLEMENTER;
use conductor::core::{TaskId, TaskStatus};
use conductor::state::SCHEMA_VERSION;
use conductor::workflow::{ExecutionStrategy, Transition};
use conductor::{PlanStatus, RoutingPlan};

use crate::fixtures::{plan_request, registry_with_limit, schedule, test_task, TestWorkspace};

/// Test: state survives reopening the store
/// Given a plan with one completed task
/// When a second store handle opens the same workspace
/// Then it sees the same plan and progress
#[test]
fn test_plan_survives_reopen() {
    let ws = TestWorkspace::new();
    let registry = ws.registry();
    let plan = plan_request(&ws.store(), &registry, "add a login feature");
    let first = plan.phases[0].tasks[0].id.clone();

    ws.store().mark_task_started(&first).unwrap();
    ws.store().mark_task_completed(&first).unwrap();

    let reopened = ws.store().load().unwrap().unwrap();
    assert_eq!(reopened.plan_id, plan.plan_id);
    assert_eq!(reopened.completed_count, 1);
    assert_eq!(reopened.task(&first).unwrap().status, TaskStatus::Completed);
    assert!(reopened.task(&first).unwrap().completed_at.is_some());
    assert_eq!(reopened.status, PlanStatus::InProgress);
}

/// Test: the document on disk carries the schema envelope
#[test]
fn test_document_is_versioned() {
    let ws = TestWorkspace::new();
    plan_request(&ws.store(), &ws.registry(), "fix crash in parser.go");

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(ws.plan_path()).unwrap()).unwrap();
    assert_eq!(raw["schema_version"], SCHEMA_VERSION);
    assert_eq!(raw["plan"]["originalRequest"], "fix crash in parser.go");
    assert_eq!(raw["plan"]["totalCount"], 3);
}

/// Test: a bare legacy plan file is upgraded on load
#[test]
fn test_legacy_document_is_migrated() {
    let ws = TestWorkspace::new();
    let registry = ws.registry();
    let phases = schedule(&registry, &[test_task("only", IMPLEMENTER, &[])]);
    let legacy = RoutingPlan::new(phases, "legacy request", 3);

    std::fs::create_dir_all(ws.plan_path().parent().unwrap()).unwrap();
    std::fs::write(ws.plan_path(), serde_json::to_string(&legacy).unwrap()).unwrap();

    let store = ws.store();
    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.plan_id, legacy.plan_id);

    // the next write stores the upgraded envelope
    let update = store.mark_task_started(&TaskId::new("only")).unwrap().unwrap();
    assert_eq!(update.transition, Transition::Applied);
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(ws.plan_path()).unwrap()).unwrap();
    assert_eq!(raw["schema_version"], SCHEMA_VERSION);
}

/// Test: a newer schema is refused rather than misread
#[test]
fn test_newer_schema_is_refused() {
    let ws = TestWorkspace::new();
    std::fs::create_dir_all(ws.plan_path().parent().unwrap()).unwrap();
    std::fs::write(
        ws.plan_path(),
        r#"{"schema_version": 99, "workspace": "x", "plan": null}"#,
    )
    .unwrap();
    assert!(ws.store().load().is_err());
}

/// Test: concurrent completions are all recorded
/// Given eight independent tasks
/// When eight threads complete one task each through a shared store
/// Then no completion is lost and the plan closes
#[test]
fn test_concurrent_completions_are_serialized() {
    let ws = TestWorkspace::new();
    let registry = registry_with_limit(IMPLEMENTER, 8);
    let tasks: Vec<_> = (1..=8)
        .map(|i| test_task(&format!("t{}", i), IMPLEMENTER, &[]))
        .collect();
    let store = Arc::new(ws.store());
    let plan = store
        .create_plan(schedule(&registry, &tasks), "parallel work")
        .unwrap();

    let handles: Vec<_> = (1..=8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let id = TaskId::new(format!("t{}", i));
                store.mark_task_started(&id).unwrap();
                store.mark_task_completed(&id).unwrap()
            })
        })
        .collect();
    for handle in handles {
        let update = handle.join().unwrap().expect("plan was active");
        assert_eq!(update.transition, Transition::Applied);
    }

    assert!(store.load().unwrap().is_none());
    let archived = store.archived(&plan.plan_id).unwrap().unwrap();
    assert_eq!(archived.completed_count, 8);
    assert_eq!(archived.status, PlanStatus::Completed);
}

/// Test: separate store handles on one workspace do not lose updates
/// Given eight threads that each open their own store, as separate CLI
/// calls would
/// When each completes a different task at the same time
/// Then every completion lands in the archived plan
#[test]
fn test_completions_from_separate_handles_are_serialized() {
    let ws = TestWorkspace::new();
    let registry = registry_with_limit(IMPLEMENTER, 8);
    let tasks: Vec<_> = (1..=8)
        .map(|i| test_task(&format!("t{}", i), IMPLEMENTER, &[]))
        .collect();
    let plan = ws
        .store()
        .create_plan(schedule(&registry, &tasks), "parallel work")
        .unwrap();

    thread::scope(|scope| {
        let handles: Vec<_> = (1..=8)
            .map(|i| {
                let ws = &ws;
                scope.spawn(move || {
                    let store = ws.store();
                    let id = TaskId::new(format!("t{}", i));
                    store.mark_task_started(&id).unwrap();
                    store.mark_task_completed(&id).unwrap()
                })
            })
            .collect();
        for handle in handles {
            let update = handle.join().unwrap().expect("plan was active");
            assert_eq!(update.transition, Transition::Applied);
        }
    });

    let store = ws.store();
    assert!(store.load().unwrap().is_none());
    let archived = store.archived(&plan.plan_id).unwrap().unwrap();
    assert_eq!(archived.completed_count, 8);
    assert_eq!(archived.status, PlanStatus::Completed);
}

/// Test: sequential config forces one task per phase and a sequential plan
#[test]
fn test_sequential_config() {
    let ws = TestWorkspace::with_config(Config {
        sequential: true,
        ..Config::default()
    });
    let registry = ws.registry();
    let draft = conductor::orchestration::Planner::from_config(&registry, &ws.config)
        .draft("Update the README and the changelog", None);
    let plan = ws
        .store()
        .create_plan(draft.into_phases(), "Update the README and the changelog")
        .unwrap();

    assert_eq!(plan.strategy, ExecutionStrategy::Sequential);
    assert!(plan.phases.iter().all(|p| p.tasks.len() == 1));
    assert_eq!(ws.store().pending_tasks().unwrap().len(), 1);
}

/// Test: replacing a plan archives the old one as cancelled
#[test]
fn test_new_plan_cancels_previous() {
    let ws = TestWorkspace::new();
    let registry = ws.registry();
    let store = ws.store();
    let old = plan_request(&store, &registry, "add a login feature");
    let new = plan_request(&store, &registry, "fix crash in parser.go");

    assert_eq!(store.load().unwrap().unwrap().plan_id, new.plan_id);
    let archived = store.archived(&old.plan_id).unwrap().unwrap();
    assert_eq!(archived.status, PlanStatus::Cancelled);
    assert!(ws
        .config
        .state_dir_for(ws.temp_dir.path())
        .join("history")
        .join(format!("{}.json", old.plan_id))
        .exists());
}

/// Test: transitions on a closed or missing task change nothing
#[test]
fn test_invalid_transitions_are_noops() {
    let ws = TestWorkspace::new();
    let store = ws.store();
    assert!(store.mark_task_completed(&TaskId::sequential(1)).unwrap().is_none());

    plan_request(&store, &ws.registry(), "fix crash in parser.go");
    let first = TaskId::sequential(1);
    store.mark_task_completed(&first).unwrap();

    let again = store.mark_task_completed(&first).unwrap().unwrap();
    assert_eq!(again.transition, Transition::AlreadyInState);
    let started = store.mark_task_started(&first).unwrap().unwrap();
    assert!(matches!(started.transition, Transition::Rejected { .. }));
    let unknown = store.mark_task_skipped(&TaskId::new("nope")).unwrap().unwrap();
    assert_eq!(unknown.transition, Transition::UnknownTask);
    assert_eq!(unknown.plan.completed_count, 1);
}
