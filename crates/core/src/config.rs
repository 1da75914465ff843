// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed agent configuration.
//!
//! Everything the operator can tune is an explicit field here; unknown keys
//! are rejected at load time rather than silently ignored.

use crate::task::TaskType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level operating strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    GoalDirected,
    ContinuousImprovement,
}

crate::simple_display! {
    Strategy {
        GoalDirected => "goal-directed",
        ContinuousImprovement => "continuous-improvement",
    }
}

/// How much of the plan requires a human yes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalLevel {
    None,
    #[default]
    Destructive,
    Commits,
    All,
}

crate::simple_display! {
    ApprovalLevel {
        None => "none",
        Destructive => "destructive",
        Commits => "commits",
        All => "all",
    }
}

impl ApprovalLevel {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.trim().to_lowercase().as_str() {
            "none" => ApprovalLevel::None,
            "destructive" => ApprovalLevel::Destructive,
            "commits" => ApprovalLevel::Commits,
            "all" => ApprovalLevel::All,
            _ => return None,
        })
    }
}

/// Discovery probe families that may be enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryStrategy {
    BuildErrors,
    FailingTests,
    TypeErrors,
    LintIssues,
    TestCoverage,
    CodeQuality,
    Refactoring,
    Documentation,
    Security,
    WorkingDir,
}

crate::simple_display! {
    DiscoveryStrategy {
        BuildErrors => "build-errors",
        FailingTests => "failing-tests",
        TypeErrors => "type-errors",
        LintIssues => "lint-issues",
        TestCoverage => "test-coverage",
        CodeQuality => "code-quality",
        Refactoring => "refactoring",
        Documentation => "documentation",
        Security => "security",
        WorkingDir => "working-dir",
    }
}

impl DiscoveryStrategy {
    /// The strategies enabled when none are configured.
    pub fn defaults() -> Vec<DiscoveryStrategy> {
        vec![
            DiscoveryStrategy::BuildErrors,
            DiscoveryStrategy::FailingTests,
            DiscoveryStrategy::TypeErrors,
            DiscoveryStrategy::LintIssues,
        ]
    }
}

/// Approval gating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApprovalConfig {
    pub level: ApprovalLevel,
    /// Task types treated as destructive for gating purposes.
    pub destructive_types: Vec<TaskType>,
    /// In a non-interactive session, approve plans whose tasks all passed the
    /// safety checks instead of auto-rejecting.
    pub auto_approve_safe_tasks: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            level: ApprovalLevel::default(),
            destructive_types: vec![TaskType::Delete, TaskType::ForcePush, TaskType::Reset],
            auto_approve_safe_tasks: false,
        }
    }
}

/// Commands the discovery probes run. Logical names; real binaries are
/// whatever the project uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProbeCommands {
    pub typecheck: String,
    pub build: String,
    pub test: String,
    pub lint: String,
}

impl Default for ProbeCommands {
    fn default() -> Self {
        Self {
            typecheck: "npm run --silent typecheck".to_string(),
            build: "npm run --silent build".to_string(),
            test: "npm test --silent".to_string(),
            lint: "npm run --silent lint".to_string(),
        }
    }
}

/// Discovery engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DiscoveryConfig {
    pub enabled_strategies: Vec<DiscoveryStrategy>,
    pub commands: ProbeCommands,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { enabled_strategies: DiscoveryStrategy::defaults(), commands: ProbeCommands::default() }
    }
}

impl DiscoveryConfig {
    pub fn is_enabled(&self, strategy: DiscoveryStrategy) -> bool {
        self.enabled_strategies.contains(&strategy)
    }
}

/// Numeric resource and retry limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LimitsConfig {
    /// Tasks in flight at once.
    pub max_concurrency: usize,
    /// Per-task execution timeout, minutes.
    pub max_task_minutes: u64,
    /// Session wall-clock limit, minutes.
    pub max_session_minutes: u64,
    /// Process RSS limit, MB.
    pub max_memory_mb: u64,
    /// Retries before a task is unrecoverable.
    pub max_retries: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            max_task_minutes: 30,
            max_session_minutes: 480,
            max_memory_mb: 2048,
            max_retries: 3,
        }
    }
}

/// The complete agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct AgentConfig {
    pub strategy: Strategy,
    pub approval: ApprovalConfig,
    pub discovery: DiscoveryConfig,
    pub limits: LimitsConfig,
    /// Root of the human-editable working space; absent disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Shell command that runs workflows. It receives the workflow name in
    /// `POLKA_WORKFLOW` and the JSON input payload in `POLKA_INPUT`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_command: Option<String>,
}

impl AgentConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: AgentConfig = toml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_concurrency == 0 {
            return Err(ConfigError::Invalid("limits.max_concurrency must be at least 1".into()));
        }
        if self.limits.max_task_minutes == 0 {
            return Err(ConfigError::Invalid("limits.max_task_minutes must be at least 1".into()));
        }
        if self.limits.max_session_minutes == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_session_minutes must be at least 1".into(),
            ));
        }
        if self.discovery.enabled_strategies.is_empty()
            && self.strategy == Strategy::ContinuousImprovement
        {
            return Err(ConfigError::Invalid(
                "continuous-improvement requires at least one discovery strategy".into(),
            ));
        }
        Ok(())
    }

    /// Per-task timeout as a duration.
    pub fn max_task_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.limits.max_task_minutes * 60)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
