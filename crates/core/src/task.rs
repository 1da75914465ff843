// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task data model: types, priorities, statuses, and workflow routing.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a task.
    ///
    /// Tasks are created by the goal decomposer or the discovery engine and
    /// keep their ID through queueing, execution, and history records.
    pub struct TaskId("task-");
}

crate::define_id! {
    /// Unique identifier for an agent session.
    ///
    /// One session corresponds to one run of the agent process, mutually
    /// exclusive across processes via the session lock.
    pub struct SessionId("sess-");
}

/// Category of work a task represents.
///
/// Closed set; discovery and decomposition only ever produce these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    Feature,
    Bugfix,
    Refactor,
    Test,
    Docs,
    Commit,
    Security,
    Optimization,
    Analysis,
    Plan,
    Other,
    Delete,
    ForcePush,
    Reset,
}

crate::simple_display! {
    TaskType {
        Feature => "feature",
        Bugfix => "bugfix",
        Refactor => "refactor",
        Test => "test",
        Docs => "docs",
        Commit => "commit",
        Security => "security",
        Optimization => "optimization",
        Analysis => "analysis",
        Plan => "plan",
        Other => "other",
        Delete => "delete",
        ForcePush => "force-push",
        Reset => "reset",
    }
}

impl TaskType {
    /// Parse a task type name tolerantly, accepting the aliases that show up
    /// in decomposition payloads (`refactoring`, `testing`, `documentation`).
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        Some(match lower.as_str() {
            "feature" => TaskType::Feature,
            "bugfix" | "bug-fix" | "fix" => TaskType::Bugfix,
            "refactor" | "refactoring" => TaskType::Refactor,
            "test" | "testing" => TaskType::Test,
            "docs" | "documentation" => TaskType::Docs,
            "commit" => TaskType::Commit,
            "security" => TaskType::Security,
            "optimization" => TaskType::Optimization,
            "analysis" => TaskType::Analysis,
            "plan" => TaskType::Plan,
            "other" | "task" => TaskType::Other,
            "delete" => TaskType::Delete,
            "force-push" => TaskType::ForcePush,
            "reset" => TaskType::Reset,
            _ => return None,
        })
    }

    /// Whether this type is destructive by default (approval gating).
    pub fn is_destructive(&self) -> bool {
        matches!(self, TaskType::Delete | TaskType::ForcePush | TaskType::Reset)
    }
}

/// External workflow a task is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    Code,
    Fix,
    Plan,
    Review,
    Commit,
    Epic,
}

crate::simple_display! {
    Workflow {
        Code => "code",
        Fix => "fix",
        Plan => "plan",
        Review => "review",
        Commit => "commit",
        Epic => "epic",
    }
}

impl Workflow {
    /// Parse a workflow name.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.trim().to_lowercase().as_str() {
            "code" => Workflow::Code,
            "fix" => Workflow::Fix,
            "plan" => Workflow::Plan,
            "review" => Workflow::Review,
            "commit" => Workflow::Commit,
            "epic" => Workflow::Epic,
            _ => return None,
        })
    }

    /// Fixed task-type name → workflow mapping.
    ///
    /// Accepts the alias spellings that appear in decomposition payloads in
    /// addition to the canonical [`TaskType`] names. Unknown names route to
    /// the planning workflow, same as `other`.
    pub fn for_type_name(name: &str) -> Workflow {
        match name.trim().to_lowercase().as_str() {
            "feature" => Workflow::Plan,
            "bugfix" => Workflow::Fix,
            "refactor" | "refactoring" => Workflow::Code,
            "test" | "testing" => Workflow::Code,
            "docs" | "documentation" => Workflow::Code,
            "review" => Workflow::Review,
            "commit" => Workflow::Commit,
            "analysis" => Workflow::Plan,
            "security" => Workflow::Fix,
            "optimization" => Workflow::Code,
            "plan" => Workflow::Plan,
            "task" => Workflow::Code,
            "delete" => Workflow::Code,
            "force-push" => Workflow::Code,
            "reset" => Workflow::Code,
            _ => Workflow::Plan,
        }
    }

    /// Workflow for a typed task.
    pub fn for_task_type(task_type: TaskType) -> Workflow {
        Self::for_type_name(&task_type.to_string())
    }
}

/// Task priority on a fixed integer scale.
///
/// Adjustments always clamp to `[TRIVIAL, CRITICAL]`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const CRITICAL: Priority = Priority(1000);
    pub const HIGH: Priority = Priority(800);
    pub const MEDIUM: Priority = Priority(600);
    pub const LOW: Priority = Priority(400);
    pub const TRIVIAL: Priority = Priority(200);

    /// Parse a priority name (`critical`, `high`, ...).
    pub fn from_name(name: &str) -> Option<Priority> {
        Some(match name.trim().to_lowercase().as_str() {
            "critical" => Self::CRITICAL,
            "high" => Self::HIGH,
            "medium" => Self::MEDIUM,
            "low" => Self::LOW,
            "trivial" => Self::TRIVIAL,
            _ => return None,
        })
    }

    /// Apply a (possibly negative) adjustment, clamping to the valid range.
    pub fn adjust(self, delta: i32) -> Priority {
        Priority(self.0.saturating_add(delta)).clamped()
    }

    /// Clamp into `[TRIVIAL, CRITICAL]`.
    pub fn clamped(self) -> Priority {
        Priority(self.0.clamp(Self::TRIVIAL.0, Self::CRITICAL.0))
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::CRITICAL => f.write_str("critical"),
            Self::HIGH => f.write_str("high"),
            Self::MEDIUM => f.write_str("medium"),
            Self::LOW => f.write_str("low"),
            Self::TRIVIAL => f.write_str("trivial"),
            Priority(n) => write!(f, "{}", n),
        }
    }
}

/// Rough implementation size of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

crate::simple_display! {
    Complexity {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

impl Complexity {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.trim().to_lowercase().as_str() {
            "low" => Complexity::Low,
            "medium" => Complexity::Medium,
            "high" => Complexity::High,
            _ => return None,
        })
    }

    /// Numeric score used when averaging complexities across a plan.
    pub fn score(self) -> u32 {
        match self {
            Complexity::Low => 1,
            Complexity::Medium => 2,
            Complexity::High => 3,
        }
    }

    /// Inverse of [`score`](Self::score), saturating at the ends.
    pub fn from_score(score: u32) -> Self {
        match score {
            0 | 1 => Complexity::Low,
            2 => Complexity::Medium,
            _ => Complexity::High,
        }
    }
}

/// Where a task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        Executing => "executing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl TaskStatus {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.trim().to_lowercase().as_str() {
            "pending" => TaskStatus::Pending,
            "executing" => TaskStatus::Executing,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "cancelled" => TaskStatus::Cancelled,
            _ => return None,
        })
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

/// Configuration for creating a new task
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub priority: Priority,
    pub complexity: Complexity,
    pub estimated_time: u32,
    pub workflow: Workflow,
    pub workflow_input: serde_json::Value,
    pub dependencies: Vec<TaskId>,
    pub files: Vec<PathBuf>,
    pub metadata: HashMap<String, String>,
}

impl TaskConfig {
    pub fn builder(title: impl Into<String>, task_type: TaskType) -> TaskConfigBuilder {
        TaskConfigBuilder {
            id: TaskId::generate(),
            title: title.into(),
            description: String::new(),
            task_type,
            priority: Priority::MEDIUM,
            complexity: Complexity::Medium,
            estimated_time: 15,
            workflow: Workflow::for_task_type(task_type),
            workflow_input: serde_json::Value::Null,
            dependencies: Vec::new(),
            files: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

pub struct TaskConfigBuilder {
    id: TaskId,
    title: String,
    description: String,
    task_type: TaskType,
    priority: Priority,
    complexity: Complexity,
    estimated_time: u32,
    workflow: Workflow,
    workflow_input: serde_json::Value,
    dependencies: Vec<TaskId>,
    files: Vec<PathBuf>,
    metadata: HashMap<String, String>,
}

impl TaskConfigBuilder {
    crate::setters! {
        into {
            description: String,
        }
        set {
            id: TaskId,
            priority: Priority,
            complexity: Complexity,
            estimated_time: u32,
            workflow: Workflow,
            workflow_input: serde_json::Value,
            dependencies: Vec<TaskId>,
            files: Vec<PathBuf>,
            metadata: HashMap<String, String>,
        }
    }

    pub fn build(self) -> TaskConfig {
        TaskConfig {
            id: self.id,
            title: self.title,
            description: self.description,
            task_type: self.task_type,
            priority: self.priority,
            complexity: self.complexity,
            estimated_time: self.estimated_time,
            workflow: self.workflow,
            workflow_input: self.workflow_input,
            dependencies: self.dependencies,
            files: self.files,
            metadata: self.metadata,
        }
    }
}

/// A unit of work the agent can schedule and execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub priority: Priority,
    pub complexity: Complexity,
    /// Estimated execution time in minutes.
    pub estimated_time: u32,
    pub status: TaskStatus,
    /// External workflow that performs this task.
    pub workflow: Workflow,
    /// Opaque payload passed to the workflow invoker.
    #[serde(default)]
    pub workflow_input: serde_json::Value,
    /// Task IDs that must complete before this one may start.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// File paths this task is expected to touch.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub retry_count: u32,
    /// Epoch milliseconds.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(config: TaskConfig, clock: &impl Clock) -> Self {
        Self::new_with_epoch_ms(config, clock.epoch_ms())
    }

    /// Create a new pending task with an explicit creation timestamp.
    pub fn new_with_epoch_ms(config: TaskConfig, epoch_ms: u64) -> Self {
        Self {
            id: config.id,
            title: config.title,
            description: config.description,
            task_type: config.task_type,
            priority: config.priority.clamped(),
            complexity: config.complexity,
            estimated_time: config.estimated_time,
            status: TaskStatus::Pending,
            workflow: config.workflow,
            workflow_input: config.workflow_input,
            dependencies: config.dependencies,
            files: config.files,
            retry_count: 0,
            created_at: epoch_ms,
            completed_at: None,
            metadata: config.metadata,
        }
    }

    /// Whole days since creation.
    pub fn age_days(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at) / 86_400_000
    }

    /// True if every dependency appears in `completed`.
    pub fn is_ready(&self, completed: &std::collections::HashSet<TaskId>) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// True if this task's file set intersects `other`'s.
    pub fn files_overlap(&self, other: &Task) -> bool {
        self.files.iter().any(|f| other.files.contains(f))
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            title: String = "test task",
            description: String = "",
        }
        set {
            id: TaskId = TaskId::generate(),
            task_type: TaskType = TaskType::Bugfix,
            priority: Priority = Priority::MEDIUM,
            complexity: Complexity = Complexity::Medium,
            estimated_time: u32 = 15,
            status: TaskStatus = TaskStatus::Pending,
            workflow: Workflow = Workflow::Fix,
            workflow_input: serde_json::Value = serde_json::Value::Null,
            dependencies: Vec<TaskId> = Vec::new(),
            files: Vec<PathBuf> = Vec::new(),
            retry_count: u32 = 0,
            created_at: u64 = 1_000_000,
            metadata: HashMap<String, String> = HashMap::new(),
        }
        option {
            completed_at: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
