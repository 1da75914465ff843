// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-execution safety checks and approval gating.

use polka_core::{ApprovalConfig, ApprovalLevel, Task, TaskPlan, TaskType};
use polka_discovery::git;
use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Paths a task should not touch casually.
const CRITICAL_FILES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    ".env",
    ".gitignore",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
];

/// What a failed check means for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckAction {
    Block,
    Warn,
    Ignore,
}

/// Result of one pre-execution check.
#[derive(Debug, Clone)]
pub struct SafetyCheck {
    pub name: &'static str,
    pub passed: bool,
    pub message: String,
    pub action: CheckAction,
}

impl SafetyCheck {
    fn passed(name: &'static str) -> Self {
        Self { name, passed: true, message: String::new(), action: CheckAction::Ignore }
    }

    fn warn(name: &'static str, message: String) -> Self {
        Self { name, passed: false, message, action: CheckAction::Warn }
    }
}

/// A task is safe iff no check blocked it.
pub fn is_safe(checks: &[SafetyCheck]) -> bool {
    checks.iter().all(|c| c.passed || c.action != CheckAction::Block)
}

/// Run the pre-execution checks for one task.
pub async fn run_checks(task: &Task, cwd: &Path, cancel: &CancellationToken) -> Vec<SafetyCheck> {
    let mut checks = Vec::new();

    if task.task_type == TaskType::Commit {
        match git::is_dirty(cwd, cancel).await {
            Some(true) => checks.push(SafetyCheck::warn(
                "uncommitted-changes",
                "working tree has uncommitted changes".to_string(),
            )),
            _ => checks.push(SafetyCheck::passed("uncommitted-changes")),
        }

        match git::current_branch(cwd, cancel).await {
            Some(branch) if branch == "main" || branch == "master" => {
                checks.push(SafetyCheck::warn(
                    "working-branch",
                    format!("committing directly to {}", branch),
                ))
            }
            _ => checks.push(SafetyCheck::passed("working-branch")),
        }
    }

    let touched: Vec<String> = task
        .files
        .iter()
        .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().into_owned()))
        .filter(|name| CRITICAL_FILES.contains(&name.as_str()))
        .collect();
    if touched.is_empty() {
        checks.push(SafetyCheck::passed("critical-files"));
    } else {
        checks.push(SafetyCheck::warn(
            "critical-files",
            format!("touches project-critical file(s): {}", touched.join(", ")),
        ));
    }

    for check in checks.iter().filter(|c| !c.passed) {
        tracing::warn!(check = check.name, message = %check.message, task_id = %task.id, "safety check");
    }
    checks
}

/// Gates tasks and plans behind the configured approval level.
pub struct ApprovalManager {
    config: ApprovalConfig,
    interactive: bool,
}

impl ApprovalManager {
    /// Detect interactivity from the controlling terminal.
    pub fn detect(config: ApprovalConfig) -> Self {
        let interactive = std::io::stdin().is_terminal();
        Self::new(config, interactive)
    }

    pub fn new(config: ApprovalConfig, interactive: bool) -> Self {
        Self { config, interactive }
    }

    fn is_destructive(&self, task: &Task) -> bool {
        self.config.destructive_types.contains(&task.task_type)
    }

    /// Whether this task needs an explicit yes before executing.
    pub fn task_needs_approval(&self, task: &Task) -> bool {
        match self.config.level {
            ApprovalLevel::None => false,
            ApprovalLevel::Destructive => self.is_destructive(task),
            ApprovalLevel::Commits => {
                task.task_type == TaskType::Commit || self.is_destructive(task)
            }
            ApprovalLevel::All => true,
        }
    }

    /// Approve or reject one task.
    pub async fn approve_task(&self, task: &Task, safe: bool) -> bool {
        if !self.task_needs_approval(task) {
            return true;
        }
        if self.interactive {
            let summary = format!(
                "Approve task '{}' ({}, priority {})?",
                task.title, task.task_type, task.priority
            );
            return prompt_yes_no(&summary).await;
        }
        self.decide_non_interactive(safe)
    }

    /// Approve or reject a whole plan.
    ///
    /// Plans always require approval when the session is interactive;
    /// otherwise the configured non-interactive choice applies regardless of
    /// the approval level.
    pub async fn approve_plan(&self, plan: &TaskPlan, all_safe: bool) -> bool {
        if self.interactive {
            let summary = plan_summary(plan);
            return prompt_yes_no(&summary).await;
        }
        self.decide_non_interactive(all_safe)
    }

    /// Non-interactive sessions auto-reject unless the operator opted into
    /// approving safe work.
    fn decide_non_interactive(&self, safe: bool) -> bool {
        let approved = self.config.auto_approve_safe_tasks && safe;
        if !approved {
            tracing::info!("approval auto-rejected (non-interactive session)");
        }
        approved
    }
}

fn plan_summary(plan: &TaskPlan) -> String {
    let mut text = format!(
        "Plan: {}\n  {} task(s), {} phase(s), ~{} minutes",
        plan.goal.as_deref().unwrap_or("continuous improvement"),
        plan.tasks.len(),
        plan.phase_count(),
        plan.estimated_time,
    );
    if !plan.risks.is_empty() {
        text.push_str("\n  Risks:");
        for risk in &plan.risks {
            text.push_str(&format!("\n    - {}", risk));
        }
    }
    text.push_str("\nApprove?");
    text
}

/// Blocking yes/no prompt on the controlling terminal.
async fn prompt_yes_no(question: &str) -> bool {
    let question = question.to_string();
    tokio::task::spawn_blocking(move || {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{} [y/N] ", question);
        let _ = stdout.flush();

        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    })
    .await
    .unwrap_or(false)
}

#[cfg(test)]
#[path = "safety_tests.rs"]
mod tests;
