//! Plan persistence.
//!
//! This module provides the `PlanStore`, the single owner of live routing
//! plans, together with its storage backends and document schema handling.

mod backend;
mod manager;
mod migration;

pub use backend::{JsonFileBackend, MemoryBackend, PlanBackend, WorkspaceLock};
pub use manager::{PlanStore, TaskUpdate};
pub use migration::{PlanDocument, SCHEMA_VERSION};
