//! Core domain models for the orchestration engine.
//!
//! This module contains the worker role registry, the task model, and the
//! dependency graph built over a decomposition.

pub mod dag;
pub mod role;
pub mod task;

pub use dag::TaskGraph;
pub use role::{OperationKind, Role, RoleRegistry};
pub use task::{Complexity, Task, TaskId, TaskStatus};
