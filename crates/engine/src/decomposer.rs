// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Goal decomposition: free-form goal in, typed task list out.
//!
//! The heavy lifting is delegated to the workflow invoker's `plan` workflow
//! with a strict output schema. This module gathers lightweight codebase
//! context for the request and turns the returned payload into real tasks:
//! ids assigned, priority names mapped to the integer scale, task types
//! routed to workflows, and title-based dependencies wired to task ids.

use crate::invoker::{InvokerError, WorkflowInvoker, WorkflowRequest};
use polka_core::{
    Clock, Complexity, Priority, Task, TaskConfig, TaskId, TaskType, Workflow,
};
use polka_discovery::git;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from goal decomposition.
#[derive(Debug, Error)]
pub enum DecomposeError {
    #[error(transparent)]
    Invoker(#[from] InvokerError),
    #[error("decomposition rejected: {0}")]
    Rejected(String),
    #[error("decomposition payload invalid: {0}")]
    Schema(String),
}

impl DecomposeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DecomposeError::Invoker(e) if e.is_cancelled())
    }
}

/// A decomposed goal, ready for planning.
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub requirements: Vec<String>,
    pub high_level_plan: String,
    pub tasks: Vec<Task>,
    pub risks: Vec<String>,
    /// Rounded average of the task complexities.
    pub estimated_complexity: Complexity,
}

/// Wire schema of the decomposition payload (camelCase, invoker-facing).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    requirements: Vec<String>,
    high_level_plan: String,
    tasks: Vec<PayloadTask>,
    #[serde(default)]
    risks: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadTask {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    task_type: String,
    priority: String,
    complexity: String,
    estimated_time: u32,
    #[serde(default)]
    files: Vec<PathBuf>,
    /// Dependencies by task title; unknown titles are dropped.
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Turns a goal into a typed task list via the plan workflow.
pub struct GoalDecomposer<I: WorkflowInvoker, C: Clock> {
    invoker: Arc<I>,
    cwd: PathBuf,
    clock: C,
}

impl<I: WorkflowInvoker, C: Clock> GoalDecomposer<I, C> {
    pub fn new(invoker: Arc<I>, cwd: impl Into<PathBuf>, clock: C) -> Self {
        Self { invoker, cwd: cwd.into(), clock }
    }

    /// Decompose `goal` into tasks.
    pub async fn decompose(
        &self,
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<Decomposition, DecomposeError> {
        let context = gather_context(&self.cwd, cancel).await;
        let request = WorkflowRequest {
            workflow: Workflow::Plan,
            input: serde_json::json!({
                "goal": goal,
                "context": context,
            }),
        };

        let outcome = self.invoker.invoke(request, cancel.clone()).await?;
        if !outcome.success {
            return Err(DecomposeError::Rejected(
                outcome.error_message().unwrap_or("no reason given").to_string(),
            ));
        }
        let data = outcome
            .data
            .ok_or_else(|| DecomposeError::Schema("missing payload".to_string()))?;
        let payload: Payload = serde_json::from_value(data)
            .map_err(|e| DecomposeError::Schema(e.to_string()))?;

        self.build(payload)
    }

    fn build(&self, payload: Payload) -> Result<Decomposition, DecomposeError> {
        if payload.requirements.is_empty() {
            return Err(DecomposeError::Schema("requirements must be non-empty".to_string()));
        }
        if payload.tasks.is_empty() {
            return Err(DecomposeError::Schema("tasks must be non-empty".to_string()));
        }

        // First pass: assign ids so title-dependencies can be wired.
        let ids: Vec<TaskId> = payload.tasks.iter().map(|_| TaskId::generate()).collect();
        let by_title: HashMap<&str, TaskId> = payload
            .tasks
            .iter()
            .zip(&ids)
            .map(|(t, id)| (t.title.as_str(), *id))
            .collect();

        let now_ms = self.clock.epoch_ms();
        let mut tasks = Vec::with_capacity(payload.tasks.len());
        let mut score_sum = 0u32;
        for (entry, id) in payload.tasks.iter().zip(&ids) {
            let task_type = TaskType::parse(&entry.task_type).unwrap_or(TaskType::Other);
            let priority =
                Priority::from_name(&entry.priority).unwrap_or(Priority::MEDIUM).clamped();
            let complexity = Complexity::parse(&entry.complexity).unwrap_or(Complexity::Medium);
            score_sum += complexity.score();

            let dependencies: Vec<TaskId> = entry
                .dependencies
                .iter()
                .filter_map(|title| {
                    let id = by_title.get(title.as_str()).copied();
                    if id.is_none() {
                        tracing::debug!(dependency = %title, "dropping unknown dependency title");
                    }
                    id
                })
                .filter(|dep| dep != id)
                .collect();

            let config = TaskConfig::builder(entry.title.clone(), task_type)
                .id(*id)
                .description(entry.description.clone())
                .priority(priority)
                .complexity(complexity)
                .estimated_time(entry.estimated_time)
                .workflow(Workflow::for_type_name(&entry.task_type))
                .workflow_input(serde_json::json!({
                    "title": entry.title,
                    "description": entry.description,
                    "files": entry.files,
                }))
                .files(entry.files.clone())
                .dependencies(dependencies)
                .build();
            tasks.push(Task::new_with_epoch_ms(config, now_ms));
        }

        let avg = (score_sum as f64 / tasks.len() as f64).round() as u32;
        Ok(Decomposition {
            requirements: payload.requirements,
            high_level_plan: payload.high_level_plan,
            tasks,
            risks: payload.risks,
            estimated_complexity: Complexity::from_score(avg),
        })
    }
}

/// Lightweight context shipped with the decomposition request.
async fn gather_context(cwd: &Path, cancel: &CancellationToken) -> serde_json::Value {
    let mut entries: Vec<String> = std::fs::read_dir(cwd)
        .map(|dir| {
            dir.flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| !name.starts_with('.'))
                .collect()
        })
        .unwrap_or_default();
    entries.sort();
    entries.truncate(50);

    let manifest = read_manifest(cwd);
    let branch = git::current_branch(cwd, cancel).await;

    serde_json::json!({
        "files": entries,
        "manifest": manifest,
        "branch": branch,
    })
}

/// Name/version/description from the project manifest, if one exists.
///
/// Checks `package.json` first (the original target ecosystem), then
/// `Cargo.toml`.
fn read_manifest(cwd: &Path) -> Option<serde_json::Value> {
    let package_json = cwd.join("package.json");
    if let Ok(text) = std::fs::read_to_string(&package_json) {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
            return Some(serde_json::json!({
                "name": json.get("name"),
                "version": json.get("version"),
                "description": json.get("description"),
            }));
        }
    }

    let cargo_toml = cwd.join("Cargo.toml");
    if let Ok(text) = std::fs::read_to_string(&cargo_toml) {
        if let Ok(value) = text.parse::<toml::Table>() {
            if let Some(package) = value.get("package") {
                return Some(serde_json::json!({
                    "name": package.get("name").and_then(|v| v.as_str()),
                    "version": package.get("version").and_then(|v| v.as_str()),
                    "description": package.get("description").and_then(|v| v.as_str()),
                }));
            }
        }
    }

    None
}

#[cfg(test)]
#[path = "decomposer_tests.rs"]
mod tests;
