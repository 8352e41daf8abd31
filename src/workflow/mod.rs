//! Routing plan model for the conductor engine.
//!
//! This module provides the plan, phase and summary types plus the pure
//! state transitions the plan store applies to them.

mod state;
mod types;

pub use state::Transition;
pub use types::{
    ExecutionStrategy, Phase, PlanId, PlanStatus, PlanSummary, RetryState, RoutingPlan,
};
