// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution plan derived from a task list.
//!
//! Plans are ephemeral: built on demand by the planner, never persisted as a
//! first-class entity. The working space stores a markdown projection.

use crate::task::{Task, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A phase-ordered execution schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    /// Absent in continuous mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub high_level_plan: String,
    pub tasks: Vec<Task>,
    /// Phases of task IDs; tasks within a phase may run concurrently.
    pub execution_order: Vec<Vec<TaskId>>,
    /// Total estimated minutes across all tasks.
    pub estimated_time: u32,
    #[serde(default)]
    pub risks: Vec<String>,
    /// Task ID → its dependency IDs.
    #[serde(default)]
    pub dependencies: HashMap<TaskId, Vec<TaskId>>,
}

impl TaskPlan {
    /// Number of phases in the schedule.
    pub fn phase_count(&self) -> usize {
        self.execution_order.len()
    }

    /// Tasks of a phase, in phase order.
    pub fn phase_tasks(&self, phase: usize) -> Vec<&Task> {
        let Some(ids) = self.execution_order.get(phase) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.tasks.iter().find(|t| &t.id == id)).collect()
    }

    /// All task IDs in schedule order, flattened.
    pub fn scheduled_ids(&self) -> Vec<TaskId> {
        self.execution_order.iter().flatten().copied().collect()
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
