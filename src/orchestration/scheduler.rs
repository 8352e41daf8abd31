//! Phase scheduler.
//!
//! Levels a task list into phases with greedy topological admission. Each
//! scan over the unassigned tasks (in declared order) admits a task when all
//! of its dependencies already sit in an earlier phase, its role still has
//! room under its concurrency limit, and the phase is below the global
//! parallelism ceiling. When a scan admits nothing while tasks remain, the
//! leftovers depend on each other or on ids that do not exist; scheduling
//! stops there and returns the phases built so far.

use std::collections::{HashMap, HashSet};

use crate::config::DEFAULT_MAX_PARALLEL;
use crate::core::{RoleRegistry, Task, TaskGraph, TaskId};
use crate::workflow::Phase;
use crate::{clog_debug, clog_warn};

/// Output of a scheduling pass.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub phases: Vec<Phase>,
    /// Tasks that could not be placed, in declared order.
    pub unresolved: Vec<TaskId>,
    /// Cycles among the unresolved tasks.
    pub cycles: Vec<Vec<TaskId>>,
    /// `(task, dependency)` pairs naming ids outside the task list.
    pub missing: Vec<(TaskId, TaskId)>,
}

impl Schedule {
    /// Every input task was placed.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|p| p.tasks.len()).sum()
    }

    /// Human-readable description of why scheduling stopped early.
    pub fn warning(&self) -> Option<String> {
        if self.is_complete() {
            return None;
        }
        let ids = |list: &[TaskId]| {
            list.iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut msg = format!(
            "circular or unresolvable dependencies: {} task(s) left unscheduled ({})",
            self.unresolved.len(),
            ids(&self.unresolved)
        );
        for cycle in &self.cycles {
            msg.push_str(&format!("\n  cycle: {}", ids(cycle)));
        }
        for (task, dep) in &self.missing {
            msg.push_str(&format!("\n  {} depends on unknown {}", task, dep));
        }
        Some(msg)
    }

    pub fn into_phases(self) -> Vec<Phase> {
        self.phases
    }
}

/// Greedy phase leveler with per-role admission control.
pub struct PhaseScheduler<'a> {
    registry: &'a RoleRegistry,
    ceiling: usize,
}

impl<'a> PhaseScheduler<'a> {
    pub fn new(registry: &'a RoleRegistry) -> Self {
        Self {
            registry,
            ceiling: DEFAULT_MAX_PARALLEL,
        }
    }

    /// Override the per-phase task ceiling. Values below 1 are treated as 1.
    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = ceiling.max(1);
        self
    }

    pub fn schedule(&self, tasks: &[Task]) -> Schedule {
        let mut assigned: HashSet<&TaskId> = HashSet::new();
        let mut remaining: Vec<&Task> = tasks.iter().collect();
        let mut phases: Vec<Phase> = Vec::new();

        while !remaining.is_empty() {
            let mut role_counts: HashMap<&str, u32> = HashMap::new();
            let mut admitted: Vec<usize> = Vec::new();

            for (pos, task) in remaining.iter().enumerate() {
                if admitted.len() >= self.ceiling {
                    break;
                }
                if !task.depends_on.iter().all(|d| assigned.contains(d)) {
                    continue;
                }
                let count = role_counts.entry(task.role.as_str()).or_default();
                if *count >= self.registry.concurrency_limit(&task.role) {
                    continue;
                }
                *count += 1;
                admitted.push(pos);
            }

            if admitted.is_empty() {
                break;
            }

            let phase_tasks: Vec<Task> = admitted.iter().map(|&i| remaining[i].clone()).collect();
            // Mark after the scan so tasks never satisfy dependencies in
            // their own phase.
            for &i in &admitted {
                let placed: &Task = remaining[i];
                assigned.insert(&placed.id);
            }
            let mut pos = 0;
            remaining.retain(|_| {
                let keep = !admitted.contains(&pos);
                pos += 1;
                keep
            });

            let index = phases.len();
            clog_debug!(
                "schedule: phase {} admitted {} task(s): {:?}",
                index,
                phase_tasks.len(),
                phase_tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>()
            );
            let parallel = phase_tasks.len() > 1;
            phases.push(Phase::new(index, parallel, phase_tasks));
        }

        let unresolved: Vec<TaskId> = remaining.iter().map(|t| t.id.clone()).collect();
        let (cycles, missing) = if unresolved.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let graph = TaskGraph::from_tasks(tasks);
            (graph.cycles(), graph.missing_dependencies().to_vec())
        };

        let schedule = Schedule {
            phases,
            unresolved,
            cycles,
            missing,
        };
        if let Some(warning) = schedule.warning() {
            clog_warn!("schedule: {}", warning);
        }
        schedule
    }
}
