// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task executor: runs one task through the workflow invoker under
//! cancellation, timeout, and a concurrency bound.

use crate::invoker::{WorkflowInvoker, WorkflowRequest};
use parking_lot::Mutex;
use polka_core::{LimitsConfig, Task, TaskId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Result of one task execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Cancelled operations report as cancelled, not as generic failures.
    pub cancelled: bool,
    pub duration: Duration,
}

impl ExecutionOutcome {
    fn failure(error: impl Into<String>, duration: Duration) -> Self {
        Self { success: false, data: None, error: Some(error.into()), cancelled: false, duration }
    }

    fn cancelled(error: impl Into<String>, duration: Duration) -> Self {
        Self { success: false, data: None, error: Some(error.into()), cancelled: true, duration }
    }

    /// Execution time in whole minutes, rounded up.
    pub fn minutes(&self) -> u32 {
        (self.duration.as_secs().div_ceil(60)) as u32
    }
}

struct RunningTask {
    token: CancellationToken,
    files: Vec<PathBuf>,
    started: Instant,
}

/// Runs tasks via the workflow invoker.
///
/// At most `max_concurrency` tasks are in flight; further `execute` calls
/// wait for a slot. Each task gets its own cancellation token, a child of
/// the root token so an interrupt cancels everything at once.
pub struct Executor<I: WorkflowInvoker> {
    invoker: Arc<I>,
    root: CancellationToken,
    max_task_duration: Duration,
    semaphore: Arc<Semaphore>,
    running: Arc<Mutex<HashMap<TaskId, RunningTask>>>,
}

impl<I: WorkflowInvoker> Executor<I> {
    pub fn new(invoker: Arc<I>, limits: &LimitsConfig, root: CancellationToken) -> Self {
        Self {
            invoker,
            root,
            max_task_duration: Duration::from_secs(limits.max_task_minutes * 60),
            semaphore: Arc::new(Semaphore::new(limits.max_concurrency)),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Execute one task to completion, cancellation, or timeout.
    pub async fn execute(&self, task: &Task) -> ExecutionOutcome {
        let start = Instant::now();

        // Waiting for a slot is a suspension point: respect the root token.
        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => permit,
            _ = self.root.cancelled() => {
                return ExecutionOutcome::cancelled("cancelled before start", start.elapsed());
            }
        };
        let _permit = match permit {
            Ok(permit) => permit,
            Err(_) => {
                return ExecutionOutcome::failure("executor shut down", start.elapsed());
            }
        };

        let token = self.root.child_token();
        {
            let mut running = self.running.lock();
            // Two tasks whose file sets intersect must not run concurrently;
            // refuse the second rather than racing writes to the same path.
            if let Some(conflict) = running
                .iter()
                .find(|(_, r)| task.files.iter().any(|f| r.files.contains(f)))
                .map(|(id, _)| *id)
            {
                return ExecutionOutcome::failure(
                    format!("file conflict with running task {}", conflict),
                    start.elapsed(),
                );
            }
            running.insert(
                task.id,
                RunningTask {
                    token: token.clone(),
                    files: task.files.clone(),
                    started: Instant::now(),
                },
            );
        }

        tracing::info!(task_id = %task.id, workflow = %task.workflow, "task started");
        let outcome = self.execute_inner(task, &token, start).await;
        self.running.lock().remove(&task.id);

        match (outcome.success, outcome.cancelled) {
            (true, _) => {
                tracing::info!(task_id = %task.id, elapsed_ms = start.elapsed().as_millis() as u64, "task completed")
            }
            (false, true) => tracing::warn!(task_id = %task.id, "task cancelled"),
            (false, false) => tracing::warn!(
                task_id = %task.id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "task failed"
            ),
        }
        outcome
    }

    async fn execute_inner(
        &self,
        task: &Task,
        token: &CancellationToken,
        start: Instant,
    ) -> ExecutionOutcome {
        let request =
            WorkflowRequest { workflow: task.workflow, input: task.workflow_input.clone() };

        tokio::select! {
            result = self.invoker.invoke(request, token.clone()) => match result {
                Ok(outcome) if outcome.success => ExecutionOutcome {
                    success: true,
                    data: outcome.data,
                    error: None,
                    cancelled: false,
                    duration: start.elapsed(),
                },
                Ok(outcome) => ExecutionOutcome::failure(
                    outcome
                        .error_message()
                        .map(str::to_string)
                        .unwrap_or_else(|| "workflow reported failure".to_string()),
                    start.elapsed(),
                ),
                Err(e) if e.is_cancelled() => {
                    ExecutionOutcome::cancelled(e.to_string(), start.elapsed())
                }
                Err(e) => ExecutionOutcome::failure(e.to_string(), start.elapsed()),
            },
            _ = tokio::time::sleep(self.max_task_duration) => {
                // Let the invoker observe cancellation before we report.
                token.cancel();
                ExecutionOutcome::failure(
                    format!("timed out after {} s", self.max_task_duration.as_secs()),
                    start.elapsed(),
                )
            }
            _ = token.cancelled() => {
                ExecutionOutcome::cancelled("cancelled", start.elapsed())
            }
        }
    }

    /// Cancel one running task. Returns false when the id is not running.
    pub fn cancel(&self, id: &TaskId) -> bool {
        match self.running.lock().get(id) {
            Some(running) => {
                running.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Fire every active cancellation handle. Callers still await the
    /// in-flight `execute` calls, which resolve to cancelled outcomes.
    pub fn cancel_all(&self) {
        for (id, running) in self.running.lock().iter() {
            tracing::info!(task_id = %id, "cancelling task");
            running.token.cancel();
        }
    }

    pub fn is_running(&self, id: &TaskId) -> bool {
        self.running.lock().contains_key(id)
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }

    /// Elapsed time of the longest-running task, for the resource monitor.
    pub fn longest_running(&self) -> Option<Duration> {
        self.running.lock().values().map(|r| r.started.elapsed()).max()
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
