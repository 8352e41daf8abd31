//! Request-to-plan pipeline tests.
//!
//! Each test starts from a natural-language request (or a hand-built task
//! set) and checks the plan the store ends up holding.

use conductor::core::role::{ARCHITECT, IMPLEMENTER, RESEARCHER, REVIEWER, TESTER};
use conductor::core::{RoleRegistry, TaskStatus};
use conductor::orchestration::{classify, DecompositionStrategy, PatternKind, Planner};
use conductor::{PlanStatus, PlanStore};

use crate::fixtures::{complete_everything, plan_request, registry_with_limit, schedule, test_task};

/// Test: new work runs design, implement, test, review in order
/// Given "add a login feature"
/// When every dispatched task is completed
/// Then the plan closes as completed
#[test]
fn test_new_work_round_trip() {
    let registry = RoleRegistry::builtin();
    let store = PlanStore::in_memory("ws");
    let plan = plan_request(&store, &registry, "add a login feature");

    let roles: Vec<Vec<&str>> = plan
        .phases
        .iter()
        .map(|p| p.tasks.iter().map(|t| t.role.as_str()).collect())
        .collect();
    assert_eq!(
        roles,
        vec![vec![ARCHITECT], vec![IMPLEMENTER], vec![TESTER], vec![REVIEWER]]
    );
    assert!(plan.phases.iter().all(|p| !p.parallel));

    let order = complete_everything(&store, &registry);
    assert_eq!(order.len(), 4);
    assert!(store.load().unwrap().is_none(), "closed plan leaves the slot");

    let archived = store.archived(&plan.plan_id).unwrap().unwrap();
    assert_eq!(archived.status, PlanStatus::Completed);
    assert_eq!(archived.completed_count, 4);
    assert_eq!(archived.progress(), 1.0);
}

/// Test: defect repair is a strict chain
/// Given "fix crash in parser.go"
/// Then only one task is ever pending
#[test]
fn test_defect_repair_one_pending_at_a_time() {
    let registry = RoleRegistry::builtin();
    let store = PlanStore::in_memory("ws");
    let plan = plan_request(&store, &registry, "fix crash in parser.go");
    assert_eq!(plan.total_count, 3);
    assert_eq!(plan.phases.len(), 3);

    let mut roles = Vec::new();
    while let Some(next) = store.pending_tasks().unwrap().first().cloned() {
        assert_eq!(store.pending_tasks().unwrap().len(), 1);
        roles.push(next.role.clone());
        store.mark_task_completed(&next.id).unwrap();
    }
    assert_eq!(roles, vec![RESEARCHER, IMPLEMENTER, TESTER]);
    assert!(store.load().unwrap().is_none());
}

/// Test: a request that matches nothing still yields work
#[test]
fn test_unmatched_request_falls_back() {
    let registry = RoleRegistry::builtin();
    let classification = classify("zzqx plorb wibble");
    assert_eq!(classification.score, 0);

    let draft = Planner::new(&registry).draft("zzqx plorb wibble", None);
    assert_eq!(draft.classification.pattern.kind, classification.pattern.kind);
    assert!(draft.schedule.task_count() >= 1);

    let store = PlanStore::in_memory("ws");
    let plan = store
        .create_plan(draft.into_phases(), "zzqx plorb wibble")
        .unwrap();
    assert!(plan.total_count >= 1);
    assert_eq!(plan.status, PlanStatus::Pending);
}

/// Test: role limits split independent work into phases
/// Given six independent tester tasks and a tester limit of 2
/// Then the scheduler emits three parallel phases of two
#[test]
fn test_role_limit_bounds_phase_width() {
    let registry = registry_with_limit(TESTER, 2);
    let tasks: Vec<_> = (1..=6)
        .map(|i| test_task(&format!("t{}", i), TESTER, &[]))
        .collect();
    let phases = schedule(&registry, &tasks);

    assert_eq!(phases.len(), 3);
    assert!(phases.iter().all(|p| p.tasks.len() == 2 && p.parallel));

    let store = PlanStore::in_memory("ws");
    let plan = store.create_plan(phases, "run the test matrix").unwrap();
    let ready = store.executable_tasks(&registry).unwrap();
    assert_eq!(ready.len(), 2);
    assert_eq!(plan.total_count, 6);
}

/// Test: scheduled phases respect dependency order
#[test]
fn test_phases_follow_dependencies() {
    let registry = RoleRegistry::builtin();
    for request in [
        "add a login feature",
        "fix crash in parser.go",
        "Update the README, the changelog and the tutorial",
        "build a new export command and document it",
        "explain where the retry counter lives",
    ] {
        let draft = Planner::new(&registry).draft(request, None);
        assert!(draft.schedule.is_complete(), "unresolved tasks for {:?}", request);

        let mut seen = std::collections::HashSet::new();
        for phase in draft.phases() {
            for task in &phase.tasks {
                for dep in &task.depends_on {
                    assert!(seen.contains(dep), "{} runs before {} in {:?}", task.id, dep, request);
                }
            }
            seen.extend(phase.tasks.iter().map(|t| t.id.clone()));
            assert_eq!(phase.parallel, phase.tasks.len() > 1);
        }
    }
}

/// Test: planning the same request twice gives the same shape
#[test]
fn test_planning_is_deterministic() {
    let registry = RoleRegistry::builtin();
    let request = "Update the README and the changelog";
    let a = Planner::new(&registry).draft(request, None);
    let b = Planner::new(&registry).draft(request, None);
    assert_eq!(a.strategy, b.strategy);
    assert_eq!(a.strategy, DecompositionStrategy::ByContentType);
    assert_eq!(a.phases(), b.phases());
    assert_eq!(a.classification.pattern.kind, PatternKind::ContentUpdate);
}

/// Test: dependency cycles are reported, not dropped silently
#[test]
fn test_cycle_is_reported() {
    let registry = RoleRegistry::builtin();
    let tasks = vec![
        test_task("a", IMPLEMENTER, &["b"]),
        test_task("b", IMPLEMENTER, &["a"]),
        test_task("c", TESTER, &[]),
    ];
    let result = conductor::orchestration::PhaseScheduler::new(&registry).schedule(&tasks);
    assert!(!result.is_complete());
    assert_eq!(result.task_count(), 1);
    let warning = result.warning().unwrap();
    assert!(warning.contains("cycle"));

    let store = PlanStore::in_memory("ws");
    let plan = store.create_plan(result.into_phases(), "cyclic").unwrap();
    assert_eq!(plan.tasks().count(), 1);
    assert_eq!(plan.tasks().next().unwrap().status, TaskStatus::Pending);
}
