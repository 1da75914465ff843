// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase-ordered execution planning.
//!
//! Topological leveling: each phase holds every task whose dependencies are
//! already completed or placed in an earlier phase. When a pass places
//! nothing and tasks remain, the dependency graph has a cycle; the leftovers
//! become one best-effort phase with their dependencies dropped so execution
//! can still make progress.

use polka_core::{Complexity, Priority, Task, TaskId, TaskPlan};
use std::collections::{HashMap, HashSet};

/// Build a plan from a task list.
///
/// `completed` holds IDs that already finished in this session; dependencies
/// on them count as satisfied. Dependencies on IDs that exist nowhere are
/// ignored (the decomposer drops unknown ones, humans sometimes write them).
pub fn create_plan(goal: Option<&str>, tasks: Vec<Task>, completed: &HashSet<TaskId>) -> TaskPlan {
    let known: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();
    let mut tasks = tasks;
    for task in &mut tasks {
        task.dependencies.retain(|dep| known.contains(dep) || completed.contains(dep));
    }

    let (execution_order, cycle) = level_phases(&tasks, completed);

    if cycle {
        // Drop dependencies inside the fallback phase so the tasks are
        // runnable.
        if let Some(fallback) = execution_order.last() {
            let fallback: HashSet<TaskId> = fallback.iter().copied().collect();
            for task in &mut tasks {
                if fallback.contains(&task.id) {
                    task.dependencies.clear();
                }
            }
        }
    }

    let mut risks = extract_risks(&tasks);
    if cycle {
        let count = execution_order.last().map(Vec::len).unwrap_or(0);
        risks.push(format!(
            "dependency cycle detected; scheduling {} task(s) best-effort with dependencies dropped",
            count
        ));
    }

    let dependencies: HashMap<TaskId, Vec<TaskId>> =
        tasks.iter().map(|t| (t.id, t.dependencies.clone())).collect();
    let estimated_time = tasks.iter().map(|t| t.estimated_time).sum();
    let high_level_plan = describe(goal, &tasks, execution_order.len());

    TaskPlan {
        goal: goal.map(str::to_string),
        high_level_plan,
        tasks,
        execution_order,
        estimated_time,
        risks,
        dependencies,
    }
}

/// Kahn-style leveling. Returns the phases and whether a cycle was broken.
fn level_phases(tasks: &[Task], completed: &HashSet<TaskId>) -> (Vec<Vec<TaskId>>, bool) {
    let mut placed: HashSet<TaskId> = completed.clone();
    let mut remaining: Vec<&Task> = tasks.iter().collect();
    let mut phases: Vec<Vec<TaskId>> = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&Task>, Vec<&Task>) = remaining
            .into_iter()
            .partition(|t| t.dependencies.iter().all(|dep| placed.contains(dep)));

        if ready.is_empty() {
            // Cycle: everything left goes into one final phase.
            phases.push(blocked.iter().map(|t| t.id).collect());
            return (phases, true);
        }

        placed.extend(ready.iter().map(|t| t.id));
        phases.push(ready.iter().map(|t| t.id).collect());
        remaining = blocked;
    }

    (phases, false)
}

/// Risk strings a human reviews before approving the plan.
fn extract_risks(tasks: &[Task]) -> Vec<String> {
    let mut risks = Vec::new();
    for task in tasks {
        if task.dependencies.len() > 5 {
            risks.push(format!(
                "'{}' has {} dependencies",
                task.title,
                task.dependencies.len()
            ));
        }
        if task.estimated_time > 120 {
            risks.push(format!(
                "long estimated time: '{}' ({} minutes)",
                task.title, task.estimated_time
            ));
        }
        if task.priority == Priority::CRITICAL && task.complexity == Complexity::High {
            risks.push(format!("high-complexity critical task: '{}'", task.title));
        }
    }
    risks
}

/// `"<goal> — N task(s) across M phase(s): <typeA>, <typeB>, …"`.
fn describe(goal: Option<&str>, tasks: &[Task], phases: usize) -> String {
    let mut types: Vec<String> = Vec::new();
    for task in tasks {
        let name = task.task_type.to_string();
        if !types.contains(&name) {
            types.push(name);
        }
    }
    format!(
        "{} — {} task(s) across {} phase(s): {}",
        goal.unwrap_or("continuous improvement"),
        tasks.len(),
        phases,
        types.join(", ")
    )
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
