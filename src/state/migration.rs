//! Plan document schema versioning.
//!
//! The persisted document is read by dashboards directly, so its shape is
//! versioned. Documents are upgraded in memory on load; the upgraded form is
//! written back on the next save.
//!
//! - version 0: a bare `RoutingPlan` object (or `null`) with no envelope
//! - version 1: `{ "schema_version": 1, "workspace": "...", "plan": ... }`

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::workflow::RoutingPlan;
use crate::{clog, clog_debug, Error, Result};

/// Current document schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// The persisted envelope around the active plan of one workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    pub schema_version: u32,
    pub workspace: String,
    pub plan: Option<RoutingPlan>,
}

impl PlanDocument {
    pub fn new(workspace: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            workspace: workspace.to_string(),
            plan: None,
        }
    }

    /// Parse a document of any supported version.
    ///
    /// Legacy documents without a workspace take `workspace` as their key.
    pub fn from_json(contents: &str, workspace: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(contents)?;
        let mut doc: PlanDocument = serde_json::from_value(migrate(value, workspace)?)?;
        if let Some(plan) = doc.plan.as_mut() {
            plan.rebuild_index();
        }
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Schema version of a raw document. Anything without the field is version 0.
pub fn detect_version(value: &Value) -> Result<u32> {
    match value.get("schema_version") {
        None => Ok(0),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| Error::Validation(format!("invalid schema_version: {}", v))),
    }
}

/// Bring a raw document up to `SCHEMA_VERSION`.
pub fn migrate(value: Value, workspace: &str) -> Result<Value> {
    let found = detect_version(&value)?;
    if found > SCHEMA_VERSION {
        return Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    let mut value = value;
    let mut version = found;
    while version < SCHEMA_VERSION {
        value = match version {
            0 => migrate_v0_to_v1(value, workspace),
            _ => value,
        };
        version += 1;
    }

    if found < SCHEMA_VERSION {
        clog!(
            "Migrated plan document from schema {} to {}",
            found,
            SCHEMA_VERSION
        );
    } else {
        clog_debug!("Plan document already at schema {}", SCHEMA_VERSION);
    }
    Ok(value)
}

fn migrate_v0_to_v1(value: Value, workspace: &str) -> Value {
    json!({
        "schema_version": 1,
        "workspace": workspace,
        "plan": value,
    })
}
