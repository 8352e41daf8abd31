//! Request-to-phases pipeline.
//!
//! Chains the classifier, decomposer and scheduler so callers that start
//! from a raw request get phases ready for `PlanStore::create_plan`.

use crate::config::{Config, DEFAULT_MAX_PARALLEL};
use crate::core::RoleRegistry;
use crate::orchestration::classifier::{classify, Classification, DecompositionStrategy};
use crate::orchestration::decomposer::{ClassifierHints, Decomposer};
use crate::orchestration::scheduler::{PhaseScheduler, Schedule};
use crate::workflow::Phase;
use crate::clog;

/// Everything the pipeline produced for one request.
#[derive(Debug, Clone)]
pub struct PlanDraft {
    pub classification: Classification,
    /// Strategy the decomposer actually used, after fallbacks.
    pub strategy: DecompositionStrategy,
    pub schedule: Schedule,
}

impl PlanDraft {
    pub fn phases(&self) -> &[Phase] {
        &self.schedule.phases
    }

    pub fn into_phases(self) -> Vec<Phase> {
        self.schedule.into_phases()
    }
}

pub struct Planner<'a> {
    registry: &'a RoleRegistry,
    max_parallel: usize,
}

impl<'a> Planner<'a> {
    pub fn new(registry: &'a RoleRegistry) -> Self {
        Self {
            registry,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    /// A sequential configuration caps every phase at one task.
    pub fn from_config(registry: &'a RoleRegistry, config: &Config) -> Self {
        let max_parallel = if config.sequential {
            1
        } else {
            config.max_parallel
        };
        Self {
            registry,
            max_parallel,
        }
    }

    pub fn draft(&self, request: &str, hints: Option<ClassifierHints>) -> PlanDraft {
        let classification = classify(request);
        let decomposition =
            Decomposer::new(self.registry).decompose(request, classification.pattern, hints);
        let strategy = decomposition.strategy;
        let schedule = PhaseScheduler::new(self.registry)
            .with_ceiling(self.max_parallel)
            .schedule(&decomposition.tasks);

        clog!(
            "planner: {} -> {} tasks in {} phases via {}",
            classification.pattern.kind,
            schedule.task_count(),
            schedule.phases.len(),
            strategy
        );
        PlanDraft {
            classification,
            strategy,
            schedule,
        }
    }
}
