//! Pattern classification for incoming work requests.
//!
//! Every request is scored against a fixed table of task patterns. A
//! pattern's score is the number of its keyword hits in the normalized
//! request plus a bonus for each verb that has one of the pattern's objects
//! within a few words of it ("add ... feature", "fix ... crash"). The best
//! score wins; ties go to the new-work pattern, which decomposes the most
//! thoroughly.
//!
//! ## Example
//!
//! ```
//! use conductor::orchestration::classifier::{classify, PatternKind};
//!
//! let result = classify("add a login feature");
//! assert_eq!(result.pattern.kind, PatternKind::NewWork);
//! assert!(result.score > 0);
//!
//! let fallback = classify("");
//! assert_eq!(fallback.pattern.kind, PatternKind::NewWork);
//! assert_eq!(fallback.score, 0);
//! ```

use serde::{Deserialize, Serialize};

use crate::core::role::{ARCHITECT, DOCUMENTER, IMPLEMENTER, RESEARCHER, REVIEWER, TESTER};
use crate::util::{count_keyword, keyword_positions, normalize_request};
use crate::clog_debug;

/// Points awarded for each verb with a matching object nearby.
pub const COMPOUND_BONUS: usize = 2;

/// Maximum distance in words between a verb and its object.
const COMPOUND_WINDOW: usize = 4;

/// Named classifications of request intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    NewWork,
    DefectRepair,
    Restructuring,
    ContentUpdate,
    PureLookup,
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternKind::NewWork => write!(f, "new_work"),
            PatternKind::DefectRepair => write!(f, "defect_repair"),
            PatternKind::Restructuring => write!(f, "restructuring"),
            PatternKind::ContentUpdate => write!(f, "content_update"),
            PatternKind::PureLookup => write!(f, "pure_lookup"),
        }
    }
}

/// How a pattern's requests are broken into tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionStrategy {
    ByResponsibility,
    ByDependencyChain,
    ByFileBoundary,
    ByContentType,
    None,
}

impl std::fmt::Display for DecompositionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecompositionStrategy::ByResponsibility => write!(f, "by_responsibility"),
            DecompositionStrategy::ByDependencyChain => write!(f, "by_dependency_chain"),
            DecompositionStrategy::ByFileBoundary => write!(f, "by_file_boundary"),
            DecompositionStrategy::ByContentType => write!(f, "by_content_type"),
            DecompositionStrategy::None => write!(f, "none"),
        }
    }
}

/// A named task pattern.
#[derive(Debug)]
pub struct TaskPattern {
    pub kind: PatternKind,
    pub keywords: &'static [&'static str],
    /// Verbs that earn the compound bonus when paired with an object.
    pub verbs: &'static [&'static str],
    pub objects: &'static [&'static str],
    pub strategy: DecompositionStrategy,
    pub default_role_sequence: &'static [&'static str],
}

impl TaskPattern {
    /// Score normalized request text against this pattern.
    pub fn score(&self, normalized: &str) -> usize {
        let hits: usize = self
            .keywords
            .iter()
            .map(|k| count_keyword(normalized, k))
            .sum();
        hits + self.compound_matches(normalized) * COMPOUND_BONUS
    }

    /// Verb occurrences that have one of the pattern's objects within
    /// `COMPOUND_WINDOW` words.
    fn compound_matches(&self, normalized: &str) -> usize {
        let objects: Vec<usize> = self
            .objects
            .iter()
            .flat_map(|o| keyword_positions(normalized, o))
            .collect();
        if objects.is_empty() {
            return 0;
        }
        self.verbs
            .iter()
            .flat_map(|v| keyword_positions(normalized, v))
            .filter(|&v| {
                objects
                    .iter()
                    .any(|&o| o != v && o.abs_diff(v) <= COMPOUND_WINDOW)
            })
            .count()
    }
}

/// The pattern table. The first entry is the default pattern.
pub static PATTERNS: [TaskPattern; 5] = [
    TaskPattern {
        kind: PatternKind::NewWork,
        keywords: &[
            "add", "create", "implement", "build", "new", "feature", "introduce",
            "support", "endpoint", "integrate", "develop", "enable",
        ],
        verbs: &["add", "create", "implement", "build", "introduce", "develop"],
        objects: &[
            "feature", "endpoint", "page", "component", "module", "api", "command",
            "screen", "function", "option", "flag", "support", "service",
        ],
        strategy: DecompositionStrategy::ByResponsibility,
        default_role_sequence: &[ARCHITECT, IMPLEMENTER, TESTER, REVIEWER],
    },
    TaskPattern {
        kind: PatternKind::DefectRepair,
        keywords: &[
            "fix", "bug", "crash", "crashes", "crashing", "error", "broken", "issue",
            "regression", "fails", "failing", "failure", "exception", "panic",
            "defect", "repair",
        ],
        verbs: &["fix", "repair", "resolve", "debug"],
        objects: &[
            "bug", "crash", "error", "issue", "regression", "failure", "exception",
            "panic", "leak",
        ],
        strategy: DecompositionStrategy::ByDependencyChain,
        default_role_sequence: &[RESEARCHER, IMPLEMENTER, TESTER],
    },
    TaskPattern {
        kind: PatternKind::Restructuring,
        keywords: &[
            "refactor", "restructure", "rename", "extract", "reorganize", "clean up",
            "cleanup", "simplify", "split", "consolidate", "decouple", "modularize",
            "migrate",
        ],
        verbs: &["refactor", "restructure", "split", "extract", "reorganize", "simplify"],
        objects: &[
            "module", "code", "file", "files", "function", "class", "component",
            "codebase",
        ],
        strategy: DecompositionStrategy::ByFileBoundary,
        default_role_sequence: &[IMPLEMENTER, REVIEWER],
    },
    TaskPattern {
        kind: PatternKind::ContentUpdate,
        keywords: &[
            "document", "documentation", "docs", "readme", "changelog", "tutorial",
            "guide", "docstring", "docstrings", "comments", "release notes",
            "api reference", "overview",
        ],
        verbs: &["update", "write", "add", "improve", "document"],
        objects: &[
            "docs", "documentation", "readme", "changelog", "tutorial", "guide",
            "comments", "docstrings",
        ],
        strategy: DecompositionStrategy::ByContentType,
        default_role_sequence: &[DOCUMENTER, REVIEWER],
    },
    TaskPattern {
        kind: PatternKind::PureLookup,
        keywords: &[
            "explain", "what", "where", "why", "how does", "find", "show", "list",
            "search", "lookup", "look up", "describe", "which",
        ],
        verbs: &["explain", "show", "find", "describe"],
        objects: &["how", "where", "why", "what"],
        strategy: DecompositionStrategy::None,
        default_role_sequence: &[RESEARCHER],
    },
];

/// The pattern used when nothing matches or scores tie.
pub fn default_pattern() -> &'static TaskPattern {
    &PATTERNS[0]
}

pub fn pattern(kind: PatternKind) -> &'static TaskPattern {
    PATTERNS
        .iter()
        .find(|p| p.kind == kind)
        .unwrap_or_else(default_pattern)
}

/// Outcome of classifying one request.
#[derive(Debug, Clone)]
pub struct Classification {
    pub pattern: &'static TaskPattern,
    pub score: usize,
    /// Every pattern's score, in table order.
    pub scores: Vec<(PatternKind, usize)>,
}

/// Classify a request. Never fails: unmatched input resolves to the default
/// pattern with score 0.
pub fn classify(request: &str) -> Classification {
    let normalized = normalize_request(request);
    let scores: Vec<(PatternKind, usize)> = PATTERNS
        .iter()
        .map(|p| (p.kind, p.score(&normalized)))
        .collect();

    let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
    let winner = if best == 0 {
        default_pattern()
    } else {
        // Table order puts the default first, so ties resolve toward it.
        scores
            .iter()
            .find(|(_, s)| *s == best)
            .map(|(kind, _)| pattern(*kind))
            .unwrap_or_else(default_pattern)
    };

    if best == 0 {
        clog_debug!("classify: no pattern matched, falling back to {}", winner.kind);
    } else {
        clog_debug!("classify: {} (score {}) scores={:?}", winner.kind, best, scores);
    }

    Classification {
        pattern: winner,
        score: best,
        scores,
    }
}
