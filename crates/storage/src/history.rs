// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only record of task execution outcomes.
//!
//! History is advisory: a missing file means an empty history, and write
//! failures are logged but never propagated. The prioritizer and the
//! reports survive losing it.

use polka_core::{ExecutionRecord, TaskType};
use std::path::PathBuf;

/// Estimation quality over the whole history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimationAccuracy {
    /// Mean absolute error, minutes.
    pub avg_error: f64,
    /// Mean absolute error as a percentage of the estimate.
    pub avg_error_pct: f64,
    pub total: usize,
}

/// Append-only execution history persisted as a JSON list.
pub struct TaskHistory {
    path: PathBuf,
    records: Vec<ExecutionRecord>,
}

impl TaskHistory {
    /// Load history from `path`, starting empty when the file is missing or
    /// unreadable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "task history unreadable, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "task history unreadable, starting empty");
                Vec::new()
            }
        };
        Self { path, records }
    }

    /// Append a record and persist. Persistence failures are logged only;
    /// history is non-critical.
    pub fn add(&mut self, record: ExecutionRecord) {
        self.records.push(record);
        self.persist();
    }

    fn persist(&self) {
        let json = match serde_json::to_string_pretty(&self.records) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "task history serialization failed");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "task history dir creation failed");
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.path, json) {
            tracing::warn!(path = %self.path.display(), error = %e, "task history write failed");
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    /// All records for one task type, oldest first.
    pub fn find_by_type(&self, task_type: TaskType) -> Vec<&ExecutionRecord> {
        self.records.iter().filter(|r| r.task_type == task_type).collect()
    }

    /// The most recent failures, newest first, at most `limit`.
    pub fn find_failed(&self, limit: usize) -> Vec<&ExecutionRecord> {
        self.records.iter().rev().filter(|r| !r.success).take(limit).collect()
    }

    /// The slowest executions, longest first, at most `limit`.
    pub fn find_slow(&self, limit: usize) -> Vec<&ExecutionRecord> {
        let mut sorted: Vec<&ExecutionRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| b.actual_time.cmp(&a.actual_time));
        sorted.truncate(limit);
        sorted
    }

    /// How far off the time estimates have been.
    pub fn estimation_accuracy(&self) -> EstimationAccuracy {
        if self.records.is_empty() {
            return EstimationAccuracy { avg_error: 0.0, avg_error_pct: 0.0, total: 0 };
        }
        let mut error_sum = 0.0;
        let mut pct_sum = 0.0;
        for record in &self.records {
            let error = (record.actual_time as f64 - record.estimated_time as f64).abs();
            error_sum += error;
            if record.estimated_time > 0 {
                pct_sum += error / record.estimated_time as f64 * 100.0;
            }
        }
        let total = self.records.len();
        EstimationAccuracy {
            avg_error: error_sum / total as f64,
            avg_error_pct: pct_sum / total as f64,
            total,
        }
    }

    /// One-screen human summary.
    pub fn report(&self) -> String {
        let total = self.records.len();
        let failed = self.records.iter().filter(|r| !r.success).count();
        let accuracy = self.estimation_accuracy();
        format!(
            "{} execution(s), {} failed, avg estimation error {:.1} min ({:.0}%)",
            total, failed, accuracy.avg_error, accuracy.avg_error_pct
        )
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
