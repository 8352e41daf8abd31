//! Dependency graph over a task list.
//!
//! `TaskGraph` is a read-only petgraph view of the `dependsOn` edges of a
//! decomposition. The scheduler uses it to explain why a leveling pass got
//! stuck (cycles vs. references to tasks that don't exist), and the
//! decomposer uses it to validate what it produced.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// The task dependency graph. Edges point from a dependency to its dependent.
pub struct TaskGraph {
    graph: DiGraph<TaskId, ()>,
    /// `(task, dependency)` pairs whose dependency is not in the task list.
    missing: Vec<(TaskId, TaskId)>,
    /// Ids declared more than once; only the first declaration is a node.
    duplicates: Vec<TaskId>,
}

impl TaskGraph {
    /// Build the graph from tasks in declaration order.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut graph = DiGraph::new();
        let mut index: HashMap<TaskId, NodeIndex> = HashMap::new();
        let mut duplicates = Vec::new();

        for task in tasks {
            if index.contains_key(&task.id) {
                duplicates.push(task.id.clone());
                continue;
            }
            let node = graph.add_node(task.id.clone());
            index.insert(task.id.clone(), node);
        }

        let mut missing = Vec::new();
        for task in tasks {
            let Some(&to) = index.get(&task.id) else {
                continue;
            };
            for dep in &task.depends_on {
                match index.get(dep) {
                    Some(&from) => {
                        if graph.find_edge(from, to).is_none() {
                            graph.add_edge(from, to, ());
                        }
                    }
                    None => missing.push((task.id.clone(), dep.clone())),
                }
            }
        }

        Self {
            graph,
            missing,
            duplicates,
        }
    }

    pub fn missing_dependencies(&self) -> &[(TaskId, TaskId)] {
        &self.missing
    }

    /// Strongly connected components that form a cycle, including
    /// single-task self-dependencies. Each cycle is sorted by id.
    pub fn cycles(&self) -> Vec<Vec<TaskId>> {
        let mut cycles: Vec<Vec<TaskId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&n| self.graph.find_edge(n, n).is_some())
            })
            .map(|component| {
                let mut ids: Vec<TaskId> = component
                    .into_iter()
                    .filter_map(|n| self.graph.node_weight(n).cloned())
                    .collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Check that the graph is a well-formed DAG: unique ids, every
    /// dependency resolvable, no cycles.
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = self.duplicates.first() {
            return Err(Error::Validation(format!("Duplicate task id: {}", id)));
        }
        if let Some((task, dep)) = self.missing.first() {
            return Err(Error::Validation(format!(
                "Task {} depends on unknown task {}",
                task, dep
            )));
        }
        if let Some(cycle) = self.cycles().first() {
            let ids: Vec<String> = cycle.iter().map(|t| t.to_string()).collect();
            return Err(Error::Validation(format!(
                "Dependency cycle between: {}",
                ids.join(", ")
            )));
        }
        Ok(())
    }
}
