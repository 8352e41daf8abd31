//! Completion driver tests against live stores.

use std::sync::Arc;

use conductor::core::{RoleRegistry, TaskId, TaskStatus};
use conductor::orchestration::{CompletionDriver, Evaluation, Outcome, TaskOutcome};
use conductor::util::blocking;
use conductor::{PlanStatus, PlanStore};

use crate::fixtures::{complete_everything, plan_request, TestWorkspace};

/// Test: retries run out and the plan escalates
/// Given a plan with three retries and work still pending
/// When the retry counter is spent and the driver checkpoints
/// Then the plan fails and the report lists the pending tasks
#[test]
fn test_exhausted_retries_escalate() {
    let registry = RoleRegistry::builtin();
    let store = PlanStore::in_memory("ws").with_max_retries(3);
    let plan = plan_request(&store, &registry, "add a login feature");

    for expected in 1..=3 {
        let retry = store.increment_retry().unwrap().unwrap();
        assert_eq!(retry.current_retry, expected);
    }

    let evaluation = CompletionDriver::new().evaluate(&store).unwrap();
    let Evaluation::Exhausted(report) = evaluation else {
        panic!("expected escalation, got {:?}", evaluation);
    };
    assert_eq!(report.pending_tasks.len(), 4);
    assert_eq!(report.original_request, "add a login feature");
    assert!(!report.retry.can_retry);
    assert!(report.recommendation.starts_with("Manual intervention required"));

    assert!(store.load().unwrap().is_none());
    let archived = store.archived(&plan.plan_id).unwrap().unwrap();
    assert_eq!(archived.status, PlanStatus::Failed);
}

/// Test: checkpoints keep the host working until the plan is done
#[test]
fn test_checkpoint_loop_to_completion() {
    let ws = TestWorkspace::new();
    let registry = ws.registry();
    let store = ws.store();
    plan_request(&store, &registry, "fix crash in parser.go");
    let driver = CompletionDriver::from_config(&ws.config);

    let first = driver.evaluate(&store).unwrap();
    let Evaluation::Continue(directive) = &first else {
        panic!("expected continuation, got {:?}", first);
    };
    assert_eq!(directive.retry.current_retry, 1);
    assert_eq!(directive.tasks.len(), 1);
    assert_eq!(directive.tasks[0].task_id, TaskId::sequential(1));
    assert!(!first.is_final());

    complete_everything(&store, &registry);
    // the last completion already closed the plan
    assert!(matches!(driver.evaluate(&store).unwrap(), Evaluation::Idle));
}

/// Test: a failed last task still lets the plan complete, with the failure reported
#[test]
fn test_failure_in_last_phase_is_reported() {
    let registry = RoleRegistry::builtin();
    let store = PlanStore::in_memory("ws");
    plan_request(&store, &registry, "fix crash in parser.go");
    store.mark_task_completed(&TaskId::sequential(1)).unwrap();
    store.mark_task_completed(&TaskId::sequential(2)).unwrap();
    store
        .apply_outcome(&TaskOutcome::failure(TaskId::sequential(3), "tests still red"))
        .unwrap();

    let evaluation = CompletionDriver::new().evaluate(&store).unwrap();
    let Evaluation::Completed(report) = evaluation else {
        panic!("expected completion, got {:?}", evaluation);
    };
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].status, TaskStatus::Failed);
    assert_eq!(report.failed[0].error.as_deref(), Some("tests still red"));
}

/// Test: a failed dependency blocks the chain until escalation
#[test]
fn test_blocked_chain_escalates() {
    let registry = RoleRegistry::builtin();
    let store = PlanStore::in_memory("ws").with_max_retries(2);
    plan_request(&store, &registry, "fix crash in parser.go");
    store
        .apply_outcome(&TaskOutcome {
            task_id: TaskId::sequential(1),
            outcome: Outcome::Failure,
            error_message: None,
        })
        .unwrap();
    assert!(store.executable_tasks(&registry).unwrap().is_empty());

    let driver = CompletionDriver::new();
    let codes: Vec<i32> = (0..3)
        .map(|_| driver.evaluate(&store).unwrap().exit_code())
        .collect();
    assert_eq!(codes, vec![0, 0, 2]);
}

/// Test: the store can be driven from async code
#[tokio::test]
async fn test_blocking_store_access() {
    let registry = Arc::new(RoleRegistry::builtin());
    let store = Arc::new(PlanStore::in_memory("ws"));
    {
        let store = Arc::clone(&store);
        let registry = Arc::clone(&registry);
        blocking(move || Ok(plan_request(&store, &registry, "explain where the retry counter lives")))
            .await
            .unwrap();
    }

    let ready = {
        let store = Arc::clone(&store);
        let registry = Arc::clone(&registry);
        blocking(move || store.dispatch(&registry)).await.unwrap()
    };
    assert_eq!(ready.len(), 1);
    assert!(ready[0].instruction_text.contains(ready[0].task_id.as_str()));

    let id = ready[0].task_id.clone();
    let evaluation = {
        let store = Arc::clone(&store);
        blocking(move || {
            store.apply_outcome(&TaskOutcome::success(id))?;
            CompletionDriver::new().evaluate(&store)
        })
        .await
        .unwrap()
    };
    assert!(matches!(evaluation, Evaluation::Idle));
}
