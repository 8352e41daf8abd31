//! Orchestration layer for the conductor engine.
//!
//! This module turns a free-form request into a scheduled plan (classifier,
//! decomposer, scheduler, planner) and interprets live plans for the host
//! (dispatch, completion driver).

pub mod classifier;
pub mod decomposer;
pub mod dispatch;
pub mod driver;
pub mod planner;
pub mod scheduler;

pub use classifier::{classify, Classification, DecompositionStrategy, PatternKind, TaskPattern};
pub use decomposer::{ClassifierHints, Decomposer, Decomposition};
pub use dispatch::{dispatch, DispatchInstruction, Outcome, TaskOutcome};
pub use driver::{
    CompletionDriver, CompletionReport, ContinuationDirective, EscalationReport, Evaluation,
    TaskLine,
};
pub use planner::{PlanDraft, Planner};
pub use scheduler::{PhaseScheduler, Schedule};
