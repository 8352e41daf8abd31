//! Worker role registry.
//!
//! Roles are the closed set of worker categories a task can be routed to.
//! The registry is built once at process start and never mutated afterwards;
//! configuration overrides produce a new registry instead.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::util::count_keyword;

pub const RESEARCHER: &str = "researcher";
pub const ARCHITECT: &str = "architect";
pub const IMPLEMENTER: &str = "implementer";
pub const TESTER: &str = "tester";
pub const REVIEWER: &str = "reviewer";
pub const DOCUMENTER: &str = "documenter";

/// Kinds of operation a role is permitted to perform on the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Read,
    Search,
    Plan,
    Write,
    Execute,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Read => write!(f, "read"),
            OperationKind::Search => write!(f, "search"),
            OperationKind::Plan => write!(f, "plan"),
            OperationKind::Write => write!(f, "write"),
            OperationKind::Execute => write!(f, "execute"),
        }
    }
}

/// A worker role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub capability_keywords: BTreeSet<String>,
    /// Maximum simultaneously executing tasks for this role (always >= 1).
    pub concurrency_limit: u32,
    pub allowed_operation_kinds: BTreeSet<OperationKind>,
    /// Position in a default design -> build -> verify -> review ordering.
    pub order: u8,
}

impl Role {
    fn new(
        name: &str,
        order: u8,
        concurrency_limit: u32,
        keywords: &[&str],
        ops: &[OperationKind],
    ) -> Self {
        Self {
            name: name.to_string(),
            capability_keywords: keywords.iter().map(|k| k.to_string()).collect(),
            concurrency_limit: concurrency_limit.max(1),
            allowed_operation_kinds: ops.iter().copied().collect(),
            order,
        }
    }

    /// Number of capability keyword hits in normalized request text.
    pub fn keyword_score(&self, normalized: &str) -> usize {
        self.capability_keywords
            .iter()
            .map(|k| count_keyword(normalized, k))
            .sum()
    }
}

/// Static table of worker roles.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: Vec<Role>,
}

impl RoleRegistry {
    /// The built-in role table.
    pub fn builtin() -> Self {
        use OperationKind::*;
        Self::with_roles(vec![
            Role::new(
                RESEARCHER,
                0,
                2,
                &[
                    "research", "investigate", "explore", "find", "search", "lookup",
                    "look up", "explain", "analyze", "understand", "locate", "trace",
                ],
                &[Read, Search],
            ),
            Role::new(
                ARCHITECT,
                1,
                1,
                &[
                    "design", "architecture", "architect", "plan", "schema", "interface",
                    "structure", "model", "api design", "data model",
                ],
                &[Read, Search, Plan],
            ),
            Role::new(
                IMPLEMENTER,
                2,
                3,
                &[
                    "implement", "build", "create", "add", "code", "develop", "integrate",
                    "write", "change", "modify", "refactor", "fix",
                ],
                &[Read, Search, Write, Execute],
            ),
            Role::new(
                TESTER,
                3,
                2,
                &[
                    "test", "tests", "testing", "verify", "validate", "coverage", "qa",
                    "regression", "benchmark",
                ],
                &[Read, Search, Execute],
            ),
            Role::new(
                REVIEWER,
                4,
                1,
                &[
                    "review", "audit", "inspect", "approve", "security", "quality",
                    "consistency",
                ],
                &[Read, Search],
            ),
            Role::new(
                DOCUMENTER,
                5,
                2,
                &[
                    "document", "documentation", "docs", "readme", "changelog", "tutorial",
                    "guide", "docstring", "comments",
                ],
                &[Read, Search, Write],
            ),
        ])
    }

    /// Build a registry from an explicit role list; later duplicates of a
    /// name are ignored.
    pub fn with_roles(roles: Vec<Role>) -> Self {
        let mut unique: Vec<Role> = Vec::with_capacity(roles.len());
        for role in roles {
            if !unique.iter().any(|r| r.name == role.name) {
                unique.push(role);
            }
        }
        unique.sort_by_key(|r| r.order);
        Self { roles: unique }
    }

    /// A registry with `overrides` applied to the named roles' concurrency
    /// limits. Unknown role names are ignored; limits below 1 become 1.
    pub fn with_limit_overrides(mut self, overrides: &BTreeMap<String, u32>) -> Self {
        for role in &mut self.roles {
            if let Some(limit) = overrides.get(&role.name) {
                role.concurrency_limit = (*limit).max(1);
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Concurrency limit of `name`, or 1 for roles the registry doesn't know.
    pub fn concurrency_limit(&self, name: &str) -> u32 {
        self.get(name).map(|r| r.concurrency_limit).unwrap_or(1)
    }

    /// Ordering weight of `name`; unknown roles sort last.
    pub fn order_of(&self, name: &str) -> u8 {
        self.get(name).map(|r| r.order).unwrap_or(u8::MAX)
    }

    /// Roles with at least one keyword hit, with their scores, in registry order.
    pub fn keyword_matches(&self, normalized: &str) -> Vec<(&Role, usize)> {
        self.roles
            .iter()
            .map(|r| (r, r.keyword_score(normalized)))
            .filter(|(_, score)| *score > 0)
            .collect()
    }

    /// Highest-scoring role for the text; ties go to the earlier role.
    pub fn best_match(&self, normalized: &str) -> Option<&Role> {
        let mut best: Option<(&Role, usize)> = None;
        for (role, score) in self.keyword_matches(normalized) {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((role, score));
            }
        }
        best.map(|(role, _)| role)
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
