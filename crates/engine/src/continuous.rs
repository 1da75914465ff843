// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The continuous-improvement loop: discover → prioritize → plan → execute →
//! back off → repeat.
//!
//! The loop never exits on an empty discovery; it doubles the backoff and
//! tries again. It exits only when the root cancellation token fires (an
//! interrupt or the session-time limit).

use crate::executor::Executor;
use crate::invoker::WorkflowInvoker;
use crate::planner::create_plan;
use crate::prioritizer::Prioritizer;
use crate::safety::{is_safe, run_checks, ApprovalManager};
use parking_lot::Mutex;
use polka_core::{
    AgentConfig, Clock, DiscoveryStrategy, ExecutionRecord, Queue, Task, TaskStatus,
};
use polka_discovery::{DiscoverOptions, DiscoveryEngine};
use polka_storage::{StateStore, TaskHistory};
use polka_workspace::WorkingSpace;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Advanced probe families; their presence in the config turns on the
/// `include_advanced` discovery pass.
const ADVANCED_STRATEGIES: &[DiscoveryStrategy] = &[
    DiscoveryStrategy::Security,
    DiscoveryStrategy::TestCoverage,
    DiscoveryStrategy::CodeQuality,
    DiscoveryStrategy::Refactoring,
    DiscoveryStrategy::Documentation,
];

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub tasks_discovered: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
}

/// Runs iterations until interrupted.
pub struct ContinuousLoop<I: WorkflowInvoker, C: Clock> {
    discovery: DiscoveryEngine<C>,
    executor: Arc<Executor<I>>,
    prioritizer: Arc<Prioritizer<C>>,
    store: Arc<StateStore>,
    history: Arc<Mutex<TaskHistory>>,
    approvals: ApprovalManager,
    workspace: Option<WorkingSpace<C>>,
    cwd: PathBuf,
    clock: C,
    cancel: CancellationToken,
}

impl<I: WorkflowInvoker, C: Clock> ContinuousLoop<I, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        invoker: Arc<I>,
        config: &AgentConfig,
        cwd: impl Into<PathBuf>,
        store: Arc<StateStore>,
        history: Arc<Mutex<TaskHistory>>,
        approvals: ApprovalManager,
        clock: C,
        cancel: CancellationToken,
    ) -> Self {
        let cwd = cwd.into();
        let discovery = DiscoveryEngine::new(
            cwd.clone(),
            config.discovery.clone(),
            clock.clone(),
            cancel.clone(),
        );
        let executor = Arc::new(Executor::new(invoker, &config.limits, cancel.clone()));
        let prioritizer = Arc::new(Prioritizer::new(clock.clone()));
        let workspace = config
            .working_dir
            .as_ref()
            .map(|dir| WorkingSpace::new(dir.clone(), clock.clone()));
        let include_working_dir = config.discovery.is_enabled(DiscoveryStrategy::WorkingDir);
        if include_working_dir && workspace.is_none() {
            tracing::warn!("working-dir strategy enabled but no working dir configured");
        }
        Self {
            discovery,
            executor,
            prioritizer,
            store,
            history,
            approvals,
            workspace,
            cwd,
            clock,
            cancel,
        }
    }

    pub fn executor(&self) -> &Arc<Executor<I>> {
        &self.executor
    }

    pub fn backoff_seconds(&self) -> u64 {
        self.discovery.backoff_seconds()
    }

    /// Run until interrupted. Returns the loop counters.
    pub async fn run(&mut self) -> LoopStats {
        let mut stats = LoopStats::default();
        let include_advanced = self.has_advanced_strategies();

        while !self.cancel.is_cancelled() {
            stats.iterations += 1;
            tracing::info!(iteration = stats.iterations, "continuous iteration starting");

            let tasks = self.gather_tasks(include_advanced).await;
            match tasks {
                Some(tasks) if !tasks.is_empty() => {
                    self.discovery.reset_backoff();
                    stats.tasks_discovered += tasks.len();
                    self.run_iteration(tasks, &mut stats).await;
                }
                Some(_) => {
                    tracing::info!("nothing discovered, backing off");
                    self.discovery.increase_backoff();
                }
                None => {
                    self.discovery.increase_backoff();
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
            self.sleep_backoff().await;
        }

        tracing::info!(
            iterations = stats.iterations,
            completed = stats.tasks_completed,
            failed = stats.tasks_failed,
            "continuous loop stopped"
        );
        stats
    }

    fn has_advanced_strategies(&self) -> bool {
        ADVANCED_STRATEGIES.iter().any(|s| self.discovery_enabled(*s))
    }

    fn discovery_enabled(&self, strategy: DiscoveryStrategy) -> bool {
        // The engine owns the config; mirror its gating for the option flag.
        self.discovery_config().is_enabled(strategy)
    }

    fn discovery_config(&self) -> &polka_core::DiscoveryConfig {
        self.discovery.config()
    }

    /// Probe findings plus human-dropped working-space tasks.
    ///
    /// Tasks whose IDs already live in a state queue are dropped: a cache
    /// hit re-reports the same findings, and enqueueing them twice would
    /// violate the single-queue invariant.
    async fn gather_tasks(&self, include_advanced: bool) -> Option<Vec<Task>> {
        let mut tasks = match self
            .discovery
            .discover(DiscoverOptions { use_cache: true, include_advanced })
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(error = %e, "discovery failed");
                return None;
            }
        };

        if self.discovery_enabled(DiscoveryStrategy::WorkingDir) {
            if let Some(workspace) = &self.workspace {
                match workspace.discover_pending_tasks() {
                    Ok(pending) => {
                        let known: HashSet<_> = tasks.iter().map(|t| t.id).collect();
                        tasks.extend(
                            pending
                                .into_iter()
                                .filter(|t| t.status == TaskStatus::Pending)
                                .filter(|t| !known.contains(&t.id)),
                        );
                    }
                    Err(e) => tracing::warn!(error = %e, "working-space discovery failed"),
                }
            }
        }

        match self.store.load() {
            Ok(Some(state)) => {
                let seen: HashSet<_> = state.all_tasks().map(|t| t.id).collect();
                tasks.retain(|t| !seen.contains(&t.id));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "state read failed during discovery"),
        }

        Some(tasks)
    }

    async fn run_iteration(&self, tasks: Vec<Task>, stats: &mut LoopStats) {
        let all: Vec<Task> = tasks.clone();
        let prioritized = self.prioritizer.prioritize(tasks, &all);
        let plan = create_plan(None, prioritized, &HashSet::new());
        tracing::info!(
            tasks = plan.tasks.len(),
            phases = plan.phase_count(),
            plan = %plan.high_level_plan,
            "iteration plan ready"
        );

        let enqueue = plan.tasks.clone();
        if let Err(e) = self.store.update(move |mut state| {
            for task in enqueue {
                state.enqueue(task);
            }
            state
        }) {
            tracing::warn!(error = %e, "iteration enqueue failed");
            return;
        }

        for phase in 0..plan.phase_count() {
            for task in plan.phase_tasks(phase) {
                if self.cancel.is_cancelled() {
                    self.executor.cancel_all();
                    return;
                }
                self.run_task(task.clone(), stats).await;
            }
        }
    }

    async fn run_task(&self, task: Task, stats: &mut LoopStats) {
        let checks = run_checks(&task, &self.cwd, &self.cancel).await;
        let safe = is_safe(&checks);

        if !safe || !self.approvals.approve_task(&task, safe).await {
            tracing::info!(task_id = %task.id, "task skipped (unsafe or declined)");
            self.drop_task(&task);
            return;
        }

        if let Err(e) = self.store.move_task(&task.id, Queue::Pending, Queue::Executing) {
            tracing::warn!(task_id = %task.id, error = %e, "task queue move failed");
            return;
        }

        let outcome = self.executor.execute(&task).await;
        if outcome.cancelled {
            // Leave the task in the executing queue; the final checkpoint
            // records the interruption and the next run re-discovers it.
            return;
        }

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
        let state_record = record.clone();
        let completed_at = self.clock.epoch_ms();
        if let Err(e) = self.store.try_update(move |state| {
            state.move_task(&id, Queue::Executing, target)?;
            if target == Queue::Completed {
                if let Some(done) = state.completed_tasks.iter_mut().find(|t| t.id == id) {
                    done.completed_at = Some(completed_at);
                }
            }
            state.record_execution(state_record);
            Ok(())
        }) {
            tracing::warn!(task_id = %task.id, error = %e, "result persistence failed");
        }

        self.history.lock().add(record);
        self.prioritizer.record_execution(&task, outcome.success);
        if outcome.success {
            stats.tasks_completed += 1;
            for file in &task.files {
                self.prioritizer.record_file_change(file);
            }
        } else {
            stats.tasks_failed += 1;
        }

        if let Some(workspace) = &self.workspace {
            let result = if outcome.success {
                "completed".to_string()
            } else {
                format!("failed: {}", outcome.error.as_deref().unwrap_or("unknown"))
            };
            if let Err(e) = workspace.document_completed_task(&task, &result) {
                tracing::warn!(task_id = %task.id, error = %e, "task documentation failed");
            }
        }
    }

    /// Remove a skipped task from the pending queue.
    fn drop_task(&self, task: &Task) {
        let id = task.id;
        let result = self.store.try_update(move |state| {
            state.move_task(&id, Queue::Pending, Queue::Failed)?;
            if let Some(entry) = state.failed_tasks.iter_mut().find(|t| t.id == id) {
                entry.status = TaskStatus::Cancelled;
            }
            Ok(())
        });
        if let Err(e) = result {
            tracing::warn!(task_id = %task.id, error = %e, "skip persistence failed");
        }
    }

    /// Sleep the backoff in one-second increments, aborting on interrupt.
    async fn sleep_backoff(&self) {
        let seconds = self.discovery.backoff_seconds();
        tracing::debug!(seconds, "sleeping before next iteration");
        for _ in 0..seconds {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    /// Increase the backoff (used by the operator surface on fatal errors).
    pub fn increase_backoff(&mut self) {
        self.discovery.increase_backoff();
    }
}

#[cfg(test)]
#[path = "continuous_tests.rs"]
mod tests;
