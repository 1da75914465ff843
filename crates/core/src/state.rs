// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator mode machine and the persisted agent state document.

use crate::clock::Clock;
use crate::config::AgentConfig;
use crate::task::{SessionId, Task, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from state transitions and queue moves.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid transition: {event} in mode {from}")]
    Transition { from: Mode, event: ModeEvent },
    #[error("task {task_id} not found in {queue} queue")]
    TaskNotInQueue { task_id: TaskId, queue: Queue },
    #[error("task {task_id} appears in more than one queue")]
    DuplicateTask { task_id: TaskId },
    #[error("task {task_id} priority {priority} outside valid range")]
    PriorityOutOfRange { task_id: TaskId, priority: i32 },
}

/// Top-level orchestrator mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Idle,
    Planning,
    Executing,
    Reviewing,
    Committing,
    ErrorRecovery,
    Stopped,
}

crate::simple_display! {
    Mode {
        Idle => "idle",
        Planning => "planning",
        Executing => "executing",
        Reviewing => "reviewing",
        Committing => "committing",
        ErrorRecovery => "error-recovery",
        Stopped => "stopped",
    }
}

/// Labeled events that drive mode transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeEvent {
    SetGoal,
    PlanReady,
    PlanRejected,
    TaskComplete,
    TaskFailed,
    ReviewPassed,
    ReviewFailed,
    Committed,
    Recovered,
    Unrecoverable,
    Interrupt,
}

crate::simple_display! {
    ModeEvent {
        SetGoal => "set-goal",
        PlanReady => "plan-ready",
        PlanRejected => "plan-rejected",
        TaskComplete => "task-complete",
        TaskFailed => "task-failed",
        ReviewPassed => "review-passed",
        ReviewFailed => "review-failed",
        Committed => "committed",
        Recovered => "recovered",
        Unrecoverable => "unrecoverable",
        Interrupt => "interrupt",
    }
}

impl Mode {
    /// Apply a transition event.
    ///
    /// Any pair outside the transition table is an error; callers must not
    /// swallow it.
    pub fn apply(self, event: ModeEvent) -> Result<Mode, StateError> {
        use Mode::*;
        use ModeEvent::*;
        match (self, event) {
            (_, Interrupt) => Ok(Stopped),
            (Idle, SetGoal) => Ok(Planning),
            (Planning, PlanReady) => Ok(Executing),
            (Planning, PlanRejected) => Ok(Idle),
            (Executing, TaskComplete) => Ok(Reviewing),
            (Executing, TaskFailed) => Ok(ErrorRecovery),
            (Reviewing, ReviewPassed) => Ok(Committing),
            (Reviewing, ReviewFailed) => Ok(Executing),
            (Committing, Committed) => Ok(Idle),
            (ErrorRecovery, Recovered) => Ok(Executing),
            (ErrorRecovery, Unrecoverable) => Ok(Stopped),
            (from, event) => Err(StateError::Transition { from, event }),
        }
    }
}

/// The four task queues of [`AgentState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Queue {
    Pending,
    Executing,
    Completed,
    Failed,
}

crate::simple_display! {
    Queue {
        Pending => "pending",
        Executing => "executing",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Identity of the process that produced a state document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub pid: u32,
    pub hostname: String,
    pub username: String,
    /// Epoch milliseconds.
    pub start_time: u64,
}

impl SessionMetadata {
    pub fn current(clock: &impl Clock) -> Self {
        Self {
            pid: std::process::id(),
            hostname: hostname(),
            username: username(),
            start_time: clock.epoch_ms(),
        }
    }
}

/// Best-effort hostname lookup.
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname").ok().map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Best-effort username lookup.
pub fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Outcome record for one task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: TaskId,
    pub task_type: crate::task::TaskType,
    /// Epoch milliseconds.
    pub timestamp: u64,
    pub success: bool,
    /// Minutes.
    pub estimated_time: u32,
    /// Minutes, rounded up.
    pub actual_time: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<String>,
}

/// The persisted agent state document.
///
/// A task is in at most one of the four queues at any time; moves between
/// queues go through [`AgentState::move_task`] so the invariant holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub session_id: SessionId,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_goal: Option<String>,
    pub config: AgentConfig,
    #[serde(default)]
    pub task_queue: Vec<Task>,
    #[serde(default)]
    pub executing_tasks: Vec<Task>,
    #[serde(default)]
    pub completed_tasks: Vec<Task>,
    #[serde(default)]
    pub failed_tasks: Vec<Task>,
    pub session_metadata: SessionMetadata,
    #[serde(default)]
    pub execution_history: Vec<ExecutionRecord>,
}

impl AgentState {
    /// Fresh state for a new session.
    pub fn new(session_id: SessionId, config: AgentConfig, clock: &impl Clock) -> Self {
        Self {
            session_id,
            mode: Mode::Idle,
            current_goal: None,
            config,
            task_queue: Vec::new(),
            executing_tasks: Vec::new(),
            completed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            session_metadata: SessionMetadata::current(clock),
            execution_history: Vec::new(),
        }
    }

    /// Apply a mode transition, failing loudly outside the table.
    pub fn transition(&mut self, event: ModeEvent) -> Result<Mode, StateError> {
        self.mode = self.mode.apply(event)?;
        Ok(self.mode)
    }

    fn queue(&self, queue: Queue) -> &Vec<Task> {
        match queue {
            Queue::Pending => &self.task_queue,
            Queue::Executing => &self.executing_tasks,
            Queue::Completed => &self.completed_tasks,
            Queue::Failed => &self.failed_tasks,
        }
    }

    fn queue_mut(&mut self, queue: Queue) -> &mut Vec<Task> {
        match queue {
            Queue::Pending => &mut self.task_queue,
            Queue::Executing => &mut self.executing_tasks,
            Queue::Completed => &mut self.completed_tasks,
            Queue::Failed => &mut self.failed_tasks,
        }
    }

    /// Move a task between queues, updating its status to match the target.
    pub fn move_task(&mut self, id: &TaskId, from: Queue, to: Queue) -> Result<(), StateError> {
        let pos = self
            .queue(from)
            .iter()
            .position(|t| &t.id == id)
            .ok_or(StateError::TaskNotInQueue { task_id: *id, queue: from })?;
        let mut task = self.queue_mut(from).remove(pos);
        task.status = match to {
            Queue::Pending => TaskStatus::Pending,
            Queue::Executing => TaskStatus::Executing,
            Queue::Completed => TaskStatus::Completed,
            Queue::Failed => TaskStatus::Failed,
        };
        self.queue_mut(to).push(task);
        Ok(())
    }

    /// Enqueue a new pending task.
    pub fn enqueue(&mut self, mut task: Task) {
        task.status = TaskStatus::Pending;
        self.task_queue.push(task);
    }

    /// Find a task in any queue.
    pub fn find_task(&self, id: &TaskId) -> Option<&Task> {
        self.all_tasks().find(|t| &t.id == id)
    }

    /// Iterate all tasks across the four queues.
    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.task_queue
            .iter()
            .chain(self.executing_tasks.iter())
            .chain(self.completed_tasks.iter())
            .chain(self.failed_tasks.iter())
    }

    /// Check the document invariants: unique queue membership and priorities
    /// within the valid range. Used by the state store's corruption detection.
    pub fn validate(&self) -> Result<(), StateError> {
        let mut seen = std::collections::HashSet::new();
        for task in self.all_tasks() {
            if !seen.insert(task.id) {
                return Err(StateError::DuplicateTask { task_id: task.id });
            }
            if task.priority != task.priority.clamped() {
                return Err(StateError::PriorityOutOfRange {
                    task_id: task.id,
                    priority: task.priority.value(),
                });
            }
        }
        Ok(())
    }

    /// Record an execution outcome in the in-document history.
    pub fn record_execution(&mut self, record: ExecutionRecord) {
        self.execution_history.push(record);
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
