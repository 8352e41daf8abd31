//! Request decomposition into a dependency-ordered task list.
//!
//! The decomposer applies the decomposition strategy of a classified
//! pattern. It never fails: anything that can't be broken down sensibly
//! becomes a single task for the best-matching role.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::core::role::{ARCHITECT, DOCUMENTER, IMPLEMENTER, RESEARCHER, REVIEWER, TESTER};
use crate::core::{Complexity, RoleRegistry, Task, TaskGraph, TaskId};
use crate::orchestration::classifier::{DecompositionStrategy, TaskPattern};
use crate::util::{extract_file_paths, normalize_request};
use crate::{clog_debug, clog_warn};

/// Optional input from an upstream intent classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierHints {
    pub complexity: Option<Complexity>,
    /// Independent requirements the upstream classifier found in the request.
    #[serde(default)]
    pub compound_requirement_count: usize,
}

/// Content types recognised by the content-type strategy, in emission order.
static CONTENT_TYPES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "overview documentation",
            Regex::new(r"\b(readme|overview|introduction|getting started)\b").unwrap(),
        ),
        (
            "interface reference",
            Regex::new(r"\b(api|interface|reference|endpoints?)\b").unwrap(),
        ),
        (
            "inline annotations",
            Regex::new(r"\b(docstrings?|inline|comments?|annotations?)\b").unwrap(),
        ),
        (
            "tutorial",
            Regex::new(r"\b(tutorials?|guides?|walkthroughs?|how to|examples?)\b").unwrap(),
        ),
        (
            "changelog",
            Regex::new(r"\b(changelog|change log|release notes)\b").unwrap(),
        ),
    ]
});

/// Direct predecessors of each role. Each inner group contributes its first
/// role that is present in the decomposition.
fn responsibility_chain(role: &str) -> &'static [&'static [&'static str]] {
    const UPSTREAM_OF_BUILD: &[&str] = &[ARCHITECT, RESEARCHER];
    const UPSTREAM_OF_VERIFY: &[&str] = &[IMPLEMENTER, ARCHITECT, RESEARCHER];
    match role {
        ARCHITECT => &[&[RESEARCHER]],
        IMPLEMENTER => &[UPSTREAM_OF_BUILD],
        TESTER | DOCUMENTER => &[UPSTREAM_OF_VERIFY],
        REVIEWER => &[UPSTREAM_OF_VERIFY, &[TESTER]],
        _ => &[],
    }
}

/// Result of decomposing one request.
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// The strategy that actually produced the tasks (after fallbacks).
    pub strategy: DecompositionStrategy,
    pub tasks: Vec<Task>,
}

/// Accumulates tasks with sequential ids.
struct TaskList {
    tasks: Vec<Task>,
}

impl TaskList {
    fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    fn push(&mut self, role: &str, description: String) -> TaskId {
        let id = TaskId::sequential(self.tasks.len() + 1);
        self.tasks.push(Task::new(id.clone(), role, &description));
        id
    }

    fn last_mut(&mut self) -> Option<&mut Task> {
        self.tasks.last_mut()
    }

    fn first_of_role(&self, role: &str) -> Option<TaskId> {
        self.tasks.iter().find(|t| t.role == role).map(|t| t.id.clone())
    }
}

pub struct Decomposer<'a> {
    registry: &'a RoleRegistry,
}

impl<'a> Decomposer<'a> {
    pub fn new(registry: &'a RoleRegistry) -> Self {
        Self { registry }
    }

    /// Break `request` into tasks using `pattern`'s strategy.
    pub fn decompose(
        &self,
        request: &str,
        pattern: &TaskPattern,
        hints: Option<ClassifierHints>,
    ) -> Decomposition {
        let normalized = normalize_request(request);
        let (strategy, mut list) = if normalized.is_empty() {
            (DecompositionStrategy::None, self.single(request, &normalized, pattern))
        } else {
            self.apply(pattern.strategy, request, &normalized, pattern)
        };

        if let Some(hints) = hints {
            self.pad_to_requirements(&mut list, request, hints.compound_requirement_count);
            self.apply_complexity(&mut list, hints.complexity);
        } else {
            self.apply_complexity(&mut list, None);
        }

        let graph = TaskGraph::from_tasks(&list.tasks);
        if let Err(e) = graph.validate() {
            clog_warn!("decompose: {} produced an invalid graph ({}), using single task", strategy, e);
            let list = self.single(request, &normalized, pattern);
            return Decomposition {
                strategy: DecompositionStrategy::None,
                tasks: list.tasks,
            };
        }

        clog_debug!(
            "decompose: pattern={} strategy={} tasks={}",
            pattern.kind,
            strategy,
            list.tasks.len()
        );
        Decomposition {
            strategy,
            tasks: list.tasks,
        }
    }

    fn apply(
        &self,
        strategy: DecompositionStrategy,
        request: &str,
        normalized: &str,
        pattern: &TaskPattern,
    ) -> (DecompositionStrategy, TaskList) {
        match strategy {
            DecompositionStrategy::ByResponsibility => {
                (strategy, self.by_responsibility(request, normalized, pattern))
            }
            DecompositionStrategy::ByDependencyChain => (strategy, self.by_dependency_chain(request)),
            DecompositionStrategy::ByFileBoundary => match self.by_file_boundary(request) {
                Some(list) => (strategy, list),
                None => {
                    clog_debug!("decompose: no file paths named, falling back to by_responsibility");
                    (
                        DecompositionStrategy::ByResponsibility,
                        self.by_responsibility(request, normalized, pattern),
                    )
                }
            },
            DecompositionStrategy::ByContentType => {
                (strategy, self.by_content_type(request, normalized))
            }
            DecompositionStrategy::None => (strategy, self.single(request, normalized, pattern)),
        }
    }

    /// One task per role named by the pattern or matched by keyword, linked
    /// along the responsibility chain.
    fn by_responsibility(&self, request: &str, normalized: &str, pattern: &TaskPattern) -> TaskList {
        let mut roles: Vec<&str> = pattern
            .default_role_sequence
            .iter()
            .copied()
            .filter(|r| self.registry.contains(r))
            .collect();
        for (role, _) in self.registry.keyword_matches(normalized) {
            if !roles.contains(&role.name.as_str()) {
                roles.push(role.name.as_str());
            }
        }
        roles.sort_by_key(|r| self.registry.order_of(r));

        if roles.is_empty() {
            return self.single(request, normalized, pattern);
        }

        let mut list = TaskList::new();
        for role in &roles {
            let deps: Vec<TaskId> = responsibility_chain(role)
                .iter()
                .filter_map(|group| group.iter().find_map(|r| list.first_of_role(r)))
                .collect();
            let (description, inputs, outputs) = responsibility_brief(role, request, &list);
            list.push(role, description);
            if let Some(task) = list.last_mut() {
                task.depends_on = deps;
                task.inputs = inputs;
                task.outputs = outputs;
            }
        }
        list
    }

    /// Locate root cause, apply fix, verify fix.
    fn by_dependency_chain(&self, request: &str) -> TaskList {
        let mut list = TaskList::new();
        let locate = list.push(RESEARCHER, format!("Locate the root cause of: {}", request));
        if let Some(task) = list.last_mut() {
            task.inputs = vec!["request".to_string()];
            task.outputs = vec!["root cause analysis".to_string()];
        }
        let fix = list.push(IMPLEMENTER, format!("Apply a fix for: {}", request));
        if let Some(task) = list.last_mut() {
            task.depends_on = vec![locate];
            task.inputs = vec!["root cause analysis".to_string()];
            task.outputs = vec!["fix".to_string()];
        }
        list.push(TESTER, format!("Verify the fix for: {}", request));
        if let Some(task) = list.last_mut() {
            task.depends_on = vec![fix];
            task.inputs = vec!["fix".to_string()];
            task.outputs = vec!["verification report".to_string()];
        }
        list
    }

    /// One implementation task per named file plus a review over all of
    /// them. `None` when the request names no files.
    fn by_file_boundary(&self, request: &str) -> Option<TaskList> {
        let files = extract_file_paths(request);
        if files.is_empty() {
            return None;
        }

        let mut list = TaskList::new();
        let mut file_tasks = Vec::with_capacity(files.len());
        for file in &files {
            let id = list.push(IMPLEMENTER, format!("Change {} for: {}", file, request));
            if let Some(task) = list.last_mut() {
                task.inputs = vec![file.clone()];
                task.outputs = vec![file.clone()];
            }
            file_tasks.push(id);
        }
        list.push(REVIEWER, format!("Review the changes across {} files", files.len()));
        if let Some(task) = list.last_mut() {
            task.depends_on = file_tasks;
            task.inputs = files;
            task.outputs = vec!["review report".to_string()];
        }
        Some(list)
    }

    /// One documentation task per detected content type, plus a
    /// consistency review when more than one type is involved.
    /// Markers are matched on the normalized request, so file paths such as
    /// `docs/api.md` never count as a content type.
    fn by_content_type(&self, request: &str, normalized: &str) -> TaskList {
        let detected: Vec<&str> = CONTENT_TYPES
            .iter()
            .filter(|(_, re)| re.is_match(normalized))
            .map(|(name, _)| *name)
            .collect();

        let mut list = TaskList::new();
        if detected.is_empty() {
            list.push(DOCUMENTER, format!("Update documentation for: {}", request));
            if let Some(task) = list.last_mut() {
                task.outputs = vec!["documentation".to_string()];
            }
            return list;
        }

        let mut doc_tasks = Vec::with_capacity(detected.len());
        for kind in &detected {
            let id = list.push(DOCUMENTER, format!("Update the {} for: {}", kind, request));
            if let Some(task) = list.last_mut() {
                task.outputs = vec![kind.to_string()];
            }
            doc_tasks.push(id);
        }
        if detected.len() > 1 {
            list.push(
                REVIEWER,
                format!("Check consistency across: {}", detected.join(", ")),
            );
            if let Some(task) = list.last_mut() {
                task.depends_on = doc_tasks;
                task.inputs = detected.iter().map(|k| k.to_string()).collect();
                task.outputs = vec!["consistency review".to_string()];
            }
        }
        list
    }

    /// A single task for the best-matching role.
    fn single(&self, request: &str, normalized: &str, pattern: &TaskPattern) -> TaskList {
        let role = self
            .registry
            .best_match(normalized)
            .map(|r| r.name.as_str())
            .or_else(|| {
                pattern
                    .default_role_sequence
                    .iter()
                    .copied()
                    .find(|r| self.registry.contains(r))
            })
            .or_else(|| self.registry.roles().first().map(|r| r.name.as_str()))
            .unwrap_or(RESEARCHER);

        let mut list = TaskList::new();
        let description = if request.trim().is_empty() {
            "Clarify the (empty) request".to_string()
        } else {
            request.trim().to_string()
        };
        list.push(role, description);
        if let Some(task) = list.last_mut() {
            task.inputs = vec!["request".to_string()];
            task.outputs = vec!["answer".to_string()];
        }
        list
    }

    /// Add implementation tasks until the list covers `required` requirements.
    fn pad_to_requirements(&self, list: &mut TaskList, request: &str, required: usize) {
        if list.tasks.len() >= required {
            return;
        }
        let design = list.first_of_role(ARCHITECT);
        let input = if design.is_some() { "design notes" } else { "request" };
        let missing = required - list.tasks.len();
        clog_debug!(
            "decompose: padding {} implementation tasks to reach {} requirements",
            missing,
            required
        );
        for n in 0..missing {
            list.push(
                IMPLEMENTER,
                format!("Implement additional requirement {} of: {}", n + 1, request),
            );
            if let Some(task) = list.last_mut() {
                task.depends_on = design.iter().cloned().collect();
                task.inputs = vec![input.to_string()];
                task.outputs = vec!["code changes".to_string()];
            }
        }
    }

    fn apply_complexity(&self, list: &mut TaskList, hint: Option<Complexity>) {
        for task in &mut list.tasks {
            task.estimated_complexity = match (task.role.as_str(), hint) {
                (IMPLEMENTER | ARCHITECT, Some(c)) => c,
                (IMPLEMENTER | ARCHITECT, None) => Complexity::Moderate,
                _ => Complexity::Simple,
            };
        }
    }
}

/// Description, inputs and outputs for a responsibility-strategy task.
fn responsibility_brief(role: &str, request: &str, list: &TaskList) -> (String, Vec<String>, Vec<String>) {
    let strs = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let upstream = if list.first_of_role(ARCHITECT).is_some() {
        "design notes"
    } else {
        "request"
    };
    match role {
        RESEARCHER => (
            format!("Research context for: {}", request),
            strs(&["request"]),
            strs(&["findings"]),
        ),
        ARCHITECT => (
            format!("Design the approach for: {}", request),
            strs(&["request"]),
            strs(&["design notes"]),
        ),
        IMPLEMENTER => (
            format!("Implement: {}", request),
            strs(&[upstream]),
            strs(&["code changes"]),
        ),
        TESTER => (
            format!("Write and run tests for: {}", request),
            strs(&["code changes"]),
            strs(&["test results"]),
        ),
        REVIEWER => (
            format!("Review the changes for: {}", request),
            strs(&["code changes", "test results"]),
            strs(&["review report"]),
        ),
        DOCUMENTER => (
            format!("Document: {}", request),
            strs(&["code changes"]),
            strs(&["documentation"]),
        ),
        other => (
            format!("{}: {}", other, request),
            strs(&["request"]),
            Vec::new(),
        ),
    }
}
