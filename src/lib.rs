pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod state;
pub mod util;
pub mod workflow;

pub use error::{Error, Result};
pub use state::PlanStore;
pub use workflow::{PlanStatus, RoutingPlan};
