//! Integration test suite for conductor.
//!
//! These tests drive the public API the way a host does: plan a request,
//! dispatch, report outcomes and checkpoint through the driver.
//!
//! # Test Categories
//!
//! - `pipeline`: classify, decompose and schedule end to end
//! - `store`: persistence, archiving and concurrent updates
//! - `driver`: continuation, completion and escalation
//!
//! No worker is ever spawned; outcomes are reported directly.

mod fixtures;

mod driver;
mod pipeline;
mod store;
