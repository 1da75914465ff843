// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level orchestrator: goal in, reviewed and committed work out.
//!
//! Sequences decompose → plan → approve → execute → review → commit through
//! the mode machine in [`polka_core::state`]. Every transition is persisted
//! via the state store before the next action, so a crash resumes from a
//! coherent mode. Interrupts arrive via the root cancellation token and move
//! the machine to `stopped` from anywhere.

use crate::decomposer::{DecomposeError, GoalDecomposer};
use crate::executor::{ExecutionOutcome, Executor};
use crate::invoker::{WorkflowInvoker, WorkflowRequest};
use crate::planner::create_plan;
use crate::prioritizer::Prioritizer;
use crate::safety::{is_safe, run_checks, ApprovalManager};
use parking_lot::Mutex;
use polka_core::{
    AgentConfig, AgentState, Clock, ExecutionRecord, ModeEvent, Queue, SessionId, Task, TaskId,
    TaskPlan, TaskStatus, Workflow,
};
use polka_storage::{StateStore, StoreError, TaskHistory};
use polka_workspace::WorkingSpace;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that end a goal run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Decompose(#[from] DecomposeError),
    #[error("run interrupted")]
    Cancelled,
    #[error("task {task_id} unrecoverable after {retries} retries: {error}")]
    Unrecoverable { task_id: TaskId, retries: u32, error: String },
    #[error("review did not pass after {attempts} attempt(s)")]
    ReviewFailed { attempts: u32 },
}

/// What a goal run produced.
#[derive(Debug, Clone, Default)]
pub struct GoalRunSummary {
    pub plan_approved: bool,
    pub completed: usize,
    pub failed: usize,
    pub committed: bool,
}

/// Drives the goal-directed flow.
pub struct Orchestrator<I: WorkflowInvoker, C: Clock> {
    invoker: Arc<I>,
    clock: C,
    cwd: PathBuf,
    config: AgentConfig,
    store: Arc<StateStore>,
    executor: Arc<Executor<I>>,
    prioritizer: Arc<Prioritizer<C>>,
    history: Arc<Mutex<TaskHistory>>,
    approvals: ApprovalManager,
    workspace: Option<WorkingSpace<C>>,
    cancel: CancellationToken,
}

impl<I: WorkflowInvoker, C: Clock> Orchestrator<I, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        invoker: Arc<I>,
        config: AgentConfig,
        cwd: impl Into<PathBuf>,
        store: Arc<StateStore>,
        history: Arc<Mutex<TaskHistory>>,
        approvals: ApprovalManager,
        clock: C,
        cancel: CancellationToken,
    ) -> Self {
        let executor =
            Arc::new(Executor::new(Arc::clone(&invoker), &config.limits, cancel.clone()));
        let prioritizer = Arc::new(Prioritizer::new(clock.clone()));
        let workspace = config
            .working_dir
            .as_ref()
            .map(|dir| WorkingSpace::new(dir.clone(), clock.clone()));
        Self {
            invoker,
            clock,
            cwd: cwd.into(),
            config,
            store,
            executor,
            prioritizer,
            history,
            approvals,
            workspace,
            cancel,
        }
    }

    pub fn executor(&self) -> &Arc<Executor<I>> {
        &self.executor
    }

    pub fn prioritizer(&self) -> &Arc<Prioritizer<C>> {
        &self.prioritizer
    }

    /// Load the existing state or start a fresh one for this session.
    ///
    /// A document left behind by another process means that session crashed
    /// without cleanup: its in-flight tasks are requeued and the machine is
    /// reset to idle under this session's identity.
    pub fn initialize(&self, session_id: SessionId) -> Result<AgentState, OrchestratorError> {
        if let Some(mut state) = self.store.load()? {
            if state.session_metadata.pid == std::process::id() {
                tracing::info!(mode = %state.mode, "resuming persisted state");
                return Ok(state);
            }
            tracing::warn!(
                previous_session = %state.session_id,
                previous_pid = state.session_metadata.pid,
                "recovering state from a session that did not exit cleanly"
            );
            let in_flight: Vec<TaskId> = state.executing_tasks.iter().map(|t| t.id).collect();
            for id in in_flight {
                if let Err(e) = state.move_task(&id, Queue::Executing, Queue::Pending) {
                    tracing::warn!(task_id = %id, error = %e, "requeue failed");
                }
            }
            state.mode = polka_core::Mode::Idle;
            state.session_id = session_id;
            state.session_metadata = polka_core::SessionMetadata::current(&self.clock);
            self.store.save(&state)?;
            return Ok(state);
        }
        let state = AgentState::new(session_id, self.config.clone(), &self.clock);
        self.store.save(&state)?;
        Ok(state)
    }

    fn check_interrupted(&self) -> Result<(), OrchestratorError> {
        if self.cancel.is_cancelled() {
            Err(OrchestratorError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Persist a mode transition before the next action.
    fn transition(&self, event: ModeEvent) -> Result<(), OrchestratorError> {
        self.store.try_update(|state| state.transition(event).map(|_| ()))?;
        Ok(())
    }

    /// Move the machine to `stopped` and cancel in-flight work.
    pub fn stop(&self) {
        self.executor.cancel_all();
        if let Err(e) = self.transition(ModeEvent::Interrupt) {
            tracing::warn!(error = %e, "interrupt transition failed");
        }
    }

    /// Run one goal end to end.
    pub async fn run_goal(&self, goal: &str) -> Result<GoalRunSummary, OrchestratorError> {
        self.check_interrupted()?;
        let goal_text = goal.to_string();
        self.store.try_update(move |state| {
            state.current_goal = Some(goal_text);
            state.transition(ModeEvent::SetGoal).map(|_| ())
        })?;
        tracing::info!(goal, "planning");

        let plan = match self.plan_goal(goal).await {
            Ok(plan) => plan,
            Err(e) => {
                // Planning failed; the machine returns to idle either way.
                let event = if e.is_cancelled() {
                    ModeEvent::Interrupt
                } else {
                    ModeEvent::PlanRejected
                };
                self.transition(event)?;
                return Err(e.into());
            }
        };

        let all_safe = self.plan_is_safe(&plan).await;
        if !self.approvals.approve_plan(&plan, all_safe).await {
            tracing::info!("plan rejected");
            self.transition(ModeEvent::PlanRejected)?;
            return Ok(GoalRunSummary::default());
        }

        let tasks = plan.tasks.clone();
        self.store.try_update(move |state| {
            for task in tasks {
                state.enqueue(task);
            }
            state.transition(ModeEvent::PlanReady).map(|_| ())
        })?;
        self.mirror_plan(&plan);

        let mut summary = GoalRunSummary { plan_approved: true, ..GoalRunSummary::default() };
        self.execute_plan(&plan, &mut summary).await?;

        self.review_and_commit(goal, &plan, &mut summary).await?;
        Ok(summary)
    }

    async fn plan_goal(&self, goal: &str) -> Result<TaskPlan, DecomposeError> {
        let decomposer =
            GoalDecomposer::new(Arc::clone(&self.invoker), self.cwd.clone(), self.clock.clone());
        let decomposition = decomposer.decompose(goal, &self.cancel).await?;
        tracing::info!(
            tasks = decomposition.tasks.len(),
            complexity = %decomposition.estimated_complexity,
            "goal decomposed"
        );
        let mut plan = create_plan(Some(goal), decomposition.tasks, &HashSet::new());
        for risk in decomposition.risks {
            if !plan.risks.contains(&risk) {
                plan.risks.push(risk);
            }
        }
        Ok(plan)
    }

    async fn plan_is_safe(&self, plan: &TaskPlan) -> bool {
        for task in &plan.tasks {
            let checks = run_checks(task, &self.cwd, &self.cancel).await;
            if !is_safe(&checks) {
                return false;
            }
        }
        true
    }

    fn mirror_plan(&self, plan: &TaskPlan) {
        let Some(workspace) = &self.workspace else { return };
        if let Err(e) = workspace.save_plan(plan) {
            tracing::warn!(error = %e, "plan mirror failed");
        }
        for task in &plan.tasks {
            if let Err(e) = workspace.create_pending_task(task) {
                tracing::warn!(task_id = %task.id, error = %e, "task mirror failed");
            }
        }
    }

    async fn execute_plan(
        &self,
        plan: &TaskPlan,
        summary: &mut GoalRunSummary,
    ) -> Result<(), OrchestratorError> {
        for phase in 0..plan.phase_count() {
            let phase_tasks: Vec<Task> =
                plan.phase_tasks(phase).into_iter().cloned().collect();
            tracing::info!(phase, tasks = phase_tasks.len(), "phase starting");

            let mut pending: Vec<Task> = phase_tasks;
            while let Some(task) = pending.pop() {
                if self.cancel.is_cancelled() {
                    self.interrupt_now();
                    return Err(OrchestratorError::Cancelled);
                }
                if let Some(retry) = self.run_task(task, summary).await? {
                    pending.push(retry);
                }
            }
        }
        Ok(())
    }

    /// Run one task; returns a task to retry, if any.
    async fn run_task(
        &self,
        task: Task,
        summary: &mut GoalRunSummary,
    ) -> Result<Option<Task>, OrchestratorError> {
        let checks = run_checks(&task, &self.cwd, &self.cancel).await;
        let safe = is_safe(&checks);

        if !self.approvals.approve_task(&task, safe).await {
            tracing::info!(task_id = %task.id, "task declined, skipping");
            self.mark_cancelled(&task)?;
            return Ok(None);
        }
        if !safe {
            tracing::warn!(task_id = %task.id, "task blocked by safety check");
            self.finish_task(&task, &blocked_outcome(), summary)?;
            return Ok(None);
        }

        self.store.move_task(&task.id, Queue::Pending, Queue::Executing)?;
        let outcome = self.executor.execute(&task).await;

        if outcome.cancelled {
            self.interrupt_now();
            return Err(OrchestratorError::Cancelled);
        }
        if outcome.success {
            self.finish_task(&task, &outcome, summary)?;
            return Ok(None);
        }

        // Failure path: error-recovery decides retry vs unrecoverable.
        self.transition(ModeEvent::TaskFailed)?;
        if task.retry_count < self.config.limits.max_retries {
            let mut retry = task.clone();
            retry.retry_count += 1;
            tracing::warn!(
                task_id = %task.id,
                retry = retry.retry_count,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "task failed, retrying"
            );
            let update = retry.clone();
            self.store.try_update(move |state| {
                state.move_task(&update.id, Queue::Executing, Queue::Pending)?;
                if let Some(queued) =
                    state.task_queue.iter_mut().find(|t| t.id == update.id)
                {
                    queued.retry_count = update.retry_count;
                }
                state.transition(ModeEvent::Recovered).map(|_| ())
            })?;
            return Ok(Some(retry));
        }

        let error = outcome.error.clone().unwrap_or_else(|| "unknown".to_string());
        self.finish_task(&task, &outcome, summary)?;
        self.transition(ModeEvent::Unrecoverable)?;
        self.executor.cancel_all();
        Err(OrchestratorError::Unrecoverable {
            task_id: task.id,
            retries: task.retry_count,
            error,
        })
    }

    /// Record the outcome everywhere it must land: state queues, in-document
    /// history, the task-history file, the prioritizer, and the workspace.
    fn finish_task(
        &self,
        task: &Task,
        outcome: &ExecutionOutcome,
        summary: &mut GoalRunSummary,
    ) -> Result<(), OrchestratorError> {
        let record = ExecutionRecord {
            task_id: task.id,
            task_type: task.task_type,
            timestamp: self.clock.epoch_ms(),
            success: outcome.success,
            estimated_time: task.estimated_time,
            actual_time: outcome.minutes(),
            error_summary: outcome.error.clone(),
        };

        let target = if outcome.success { Queue::Completed } else { Queue::Failed };
        let id = task.id;
        let completed_at = self.clock.epoch_ms();
        let state_record = record.clone();
        self.store.try_update(move |state| {
            // The blocked path never moved the task out of pending.
            if state.task_queue.iter().any(|t| t.id == id) {
                state.move_task(&id, Queue::Pending, Queue::Executing)?;
            }
            state.move_task(&id, Queue::Executing, target)?;
            if target == Queue::Completed {
                if let Some(done) = state.completed_tasks.iter_mut().find(|t| t.id == id) {
                    done.completed_at = Some(completed_at);
                }
            }
            state.record_execution(state_record);
            Ok(())
        })?;

        self.history.lock().add(record);
        self.prioritizer.record_execution(task, outcome.success);
        if outcome.success {
            summary.completed += 1;
            for file in &task.files {
                self.prioritizer.record_file_change(file);
            }
        } else {
            summary.failed += 1;
        }

        if let Some(workspace) = &self.workspace {
            let result = if outcome.success {
                outcome
                    .data
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "completed".to_string())
            } else {
                format!("failed: {}", outcome.error.as_deref().unwrap_or("unknown"))
            };
            if let Err(e) = workspace.document_completed_task(task, &result) {
                tracing::warn!(task_id = %task.id, error = %e, "task documentation failed");
            }
        }
        Ok(())
    }

    /// A declined task leaves the queue as cancelled, not failed.
    fn mark_cancelled(&self, task: &Task) -> Result<(), OrchestratorError> {
        let id = task.id;
        self.store.try_update(move |state| {
            state.move_task(&id, Queue::Pending, Queue::Failed)?;
            if let Some(entry) = state.failed_tasks.iter_mut().find(|t| t.id == id) {
                entry.status = TaskStatus::Cancelled;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn interrupt_now(&self) {
        self.executor.cancel_all();
        if let Err(e) = self.transition(ModeEvent::Interrupt) {
            tracing::warn!(error = %e, "interrupt transition failed");
        }
    }

    /// The review → commit tail of a successful execution pass.
    async fn review_and_commit(
        &self,
        goal: &str,
        plan: &TaskPlan,
        summary: &mut GoalRunSummary,
    ) -> Result<(), OrchestratorError> {
        self.check_interrupted()?;
        self.transition(ModeEvent::TaskComplete)?;

        let completed: Vec<String> =
            plan.tasks.iter().map(|t| t.id.as_str().to_string()).collect();
        let review_input = serde_json::json!({ "goal": goal, "tasks": completed });

        let mut attempts = 0u32;
        let review_passed = loop {
            attempts += 1;
            let outcome = self
                .invoker
                .invoke(
                    WorkflowRequest { workflow: Workflow::Review, input: review_input.clone() },
                    self.cancel.child_token(),
                )
                .await;
            match outcome {
                Ok(result) if result.success => break true,
                Ok(result) => {
                    tracing::warn!(
                        attempt = attempts,
                        error = result.error_message().unwrap_or("review reported failure"),
                        "review failed"
                    );
                }
                Err(e) if e.is_cancelled() => {
                    self.interrupt_now();
                    return Err(OrchestratorError::Cancelled);
                }
                Err(e) => tracing::warn!(attempt = attempts, error = %e, "review errored"),
            }
            if attempts > self.config.limits.max_retries {
                break false;
            }
            // reviewing → executing → reviewing for the retry
            self.transition(ModeEvent::ReviewFailed)?;
            self.transition(ModeEvent::TaskComplete)?;
        };

        if !review_passed {
            self.transition(ModeEvent::ReviewFailed)?;
            self.transition(ModeEvent::TaskFailed)?;
            self.transition(ModeEvent::Unrecoverable)?;
            return Err(OrchestratorError::ReviewFailed { attempts });
        }

        self.transition(ModeEvent::ReviewPassed)?;
        let commit_input = serde_json::json!({ "goal": goal });
        let committed = match self
            .invoker
            .invoke(
                WorkflowRequest { workflow: Workflow::Commit, input: commit_input },
                self.cancel.child_token(),
            )
            .await
        {
            Ok(result) if result.success => true,
            Ok(result) => {
                tracing::warn!(
                    error = result.error_message().unwrap_or("commit reported failure"),
                    "commit failed"
                );
                false
            }
            Err(e) if e.is_cancelled() => {
                self.interrupt_now();
                return Err(OrchestratorError::Cancelled);
            }
            Err(e) => {
                tracing::warn!(error = %e, "commit errored");
                false
            }
        };
        summary.committed = committed;

        // Commit is best-effort; the cycle closes back to idle either way.
        self.transition(ModeEvent::Committed)?;
        tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            committed,
            "goal run finished"
        );
        Ok(())
    }
}

fn blocked_outcome() -> ExecutionOutcome {
    ExecutionOutcome {
        success: false,
        data: None,
        error: Some("blocked by safety check".to_string()),
        cancelled: false,
        duration: std::time::Duration::ZERO,
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
