// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! History-conditioned priority adjustment.
//!
//! Scores start from the task's own priority and shift based on what this
//! session has seen: prior failures, dependency position, file hotness, age,
//! and retries. Adjustments always clamp to the valid priority range and the
//! resulting order is deterministic for identical inputs.

use parking_lot::Mutex;
use polka_core::{Clock, Priority, Task, TaskId, TaskStatus};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Failure recency window for the file-failure boost.
const FAILURE_WINDOW_MS: u64 = 3_600_000;

/// A file changed more than this often is "hot".
const HOT_FILE_CHANGES: u32 = 5;

#[derive(Default)]
struct History {
    failed_tasks: HashSet<TaskId>,
    file_changes: HashMap<PathBuf, u32>,
    /// Failure timestamps per file, pruned to the recency window.
    file_failures: HashMap<PathBuf, Vec<u64>>,
}

/// Mutates task priorities based on in-process execution history.
pub struct Prioritizer<C: Clock> {
    clock: C,
    history: Mutex<History>,
}

impl<C: Clock> Prioritizer<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, history: Mutex::new(History::default()) }
    }

    /// Return `candidates` with adjusted priorities, highest first.
    ///
    /// Ties break toward the oldest `created_at`, so identical inputs always
    /// produce identical order.
    pub fn prioritize(&self, candidates: Vec<Task>, all_tasks: &[Task]) -> Vec<Task> {
        let now_ms = self.clock.epoch_ms();
        let history = self.history.lock();

        let mut scored: Vec<Task> = candidates
            .into_iter()
            .map(|mut task| {
                let delta = self.score(&task, all_tasks, &history, now_ms);
                task.priority = task.priority.adjust(delta);
                task
            })
            .collect();
        drop(history);

        scored.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at))
        });
        scored
    }

    fn score(&self, task: &Task, all_tasks: &[Task], history: &History, now_ms: u64) -> i32 {
        let mut delta = 0i32;

        if history.failed_tasks.contains(&task.id) {
            delta += 200;
        }

        let blocked = task.dependencies.iter().any(|dep| {
            all_tasks.iter().any(|t| &t.id == dep && t.status != TaskStatus::Completed)
        });
        if blocked {
            delta -= 150;
        }

        let is_prerequisite = all_tasks.iter().any(|t| {
            t.id != task.id
                && t.status != TaskStatus::Completed
                && t.dependencies.contains(&task.id)
        });
        if is_prerequisite {
            delta += 100;
        }

        let touches_hot_file = task
            .files
            .iter()
            .any(|f| history.file_changes.get(f).copied().unwrap_or(0) > HOT_FILE_CHANGES);
        if touches_hot_file {
            delta += 150;
        }

        let touches_failing_file = task.files.iter().any(|f| {
            history
                .file_failures
                .get(f)
                .map(|times| {
                    times.iter().filter(|t| now_ms.saturating_sub(**t) < FAILURE_WINDOW_MS).count()
                        >= 2
                })
                .unwrap_or(false)
        });
        if touches_failing_file {
            delta += 100;
        }

        let age_boost = (task.age_days(now_ms) as i32 * 50).min(150);
        delta += age_boost;

        if task.retry_count > 0 {
            delta += (task.retry_count as i32 * 100).min(300);
        }

        delta
    }

    /// Record an execution outcome. Failures also mark the task's files so
    /// repeat offenders within the hour get boosted.
    pub fn record_execution(&self, task: &Task, success: bool) {
        let mut history = self.history.lock();
        if success {
            history.failed_tasks.remove(&task.id);
            return;
        }
        history.failed_tasks.insert(task.id);
        let now_ms = self.clock.epoch_ms();
        for file in &task.files {
            let times = history.file_failures.entry(file.clone()).or_default();
            times.push(now_ms);
            times.retain(|t| now_ms.saturating_sub(*t) < FAILURE_WINDOW_MS);
        }
    }

    /// Count a file change observed in this process.
    pub fn record_file_change(&self, path: &Path) {
        let mut history = self.history.lock();
        *history.file_changes.entry(path.to_path_buf()).or_insert(0) += 1;
    }

    /// Forget everything.
    pub fn reset_history(&self) {
        *self.history.lock() = History::default();
    }
}

#[cfg(test)]
#[path = "prioritizer_tests.rs"]
mod tests;
