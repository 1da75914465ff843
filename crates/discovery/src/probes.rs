// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health probes that turn project symptoms into tasks.
//!
//! Probe ordering is part of the engine contract: type-check before build
//! before tests, and a build-level failure short-circuits the test probe
//! (fixing the build comes first, and the test run would only add noise).

use crate::subprocess::{run_shell, CommandOutput, SubprocessError, PROBE_TIMEOUT};
use polka_core::{Priority, ProbeCommands, Task, TaskConfig, TaskType, Workflow};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Source extensions the file-scanning probes look at.
const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

/// Directories the file scan never descends into.
const SKIP_DIRS: &[&str] = &["node_modules", ".git", "dist", "build", "coverage", "target", ".polka"];

/// Upper bound on scanned files per discovery pass.
const MAX_SCANNED_FILES: usize = 500;

/// Runs probes against one project directory.
pub struct Prober<'a> {
    pub cwd: &'a Path,
    pub commands: &'a ProbeCommands,
    pub cancel: &'a CancellationToken,
    /// Creation timestamp for emitted tasks, epoch ms.
    pub now_ms: u64,
}

/// What the build-errors probe found.
pub struct BuildProbeOutcome {
    pub tasks: Vec<Task>,
    /// A build-level failure short-circuits the test probe.
    pub skip_tests: bool,
}

impl<'a> Prober<'a> {
    pub(crate) fn task(
        &self,
        title: impl Into<String>,
        task_type: TaskType,
        priority: Priority,
        workflow: Workflow,
        estimated_time: u32,
        probe: &str,
        description: String,
        files: Vec<PathBuf>,
    ) -> Task {
        let config = TaskConfig::builder(title, task_type)
            .description(description)
            .priority(priority)
            .estimated_time(estimated_time)
            .workflow(workflow)
            .files(files)
            .metadata([("probe".to_string(), probe.to_string())].into())
            .build();
        Task::new_with_epoch_ms(config, self.now_ms)
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, SubprocessError> {
        run_shell(command, self.cwd, PROBE_TIMEOUT, self.cancel).await
    }

    /// Probe 1: type-check, then build.
    ///
    /// A failing type-check emits one HIGH bugfix task and skips the build;
    /// a failing build emits one CRITICAL bugfix task. Either way the test
    /// probe is skipped.
    pub async fn build_errors(&self) -> Result<BuildProbeOutcome, SubprocessError> {
        let typecheck = self.run(&self.commands.typecheck).await?;
        if !typecheck.success() {
            let task = self.task(
                "Fix type-check errors",
                TaskType::Bugfix,
                Priority::HIGH,
                Workflow::Code,
                30,
                "build-errors",
                summarize("Type-check failed", &typecheck),
                Vec::new(),
            );
            return Ok(BuildProbeOutcome { tasks: vec![task], skip_tests: true });
        }

        let build = self.run(&self.commands.build).await?;
        if !build.success() {
            let task = self.task(
                "Fix build failure",
                TaskType::Bugfix,
                Priority::CRITICAL,
                Workflow::Code,
                45,
                "build-errors",
                summarize("Build failed", &build),
                Vec::new(),
            );
            return Ok(BuildProbeOutcome { tasks: vec![task], skip_tests: true });
        }

        Ok(BuildProbeOutcome { tasks: Vec::new(), skip_tests: false })
    }

    /// Probe 2: test run. Counts failure-marker lines.
    pub async fn failing_tests(&self) -> Result<Option<Task>, SubprocessError> {
        let output = self.run(&self.commands.test).await?;
        if output.success() {
            return Ok(None);
        }
        let combined = output.combined();
        let failures = combined
            .lines()
            .filter(|line| {
                line.contains('✗') || line.to_lowercase().contains("fail") || line.contains("Error:")
            })
            .count()
            .max(1) as u32;

        let estimated = (10 * failures).min(60);
        Ok(Some(self.task(
            format!("Fix {} failing test(s)", failures),
            TaskType::Bugfix,
            Priority::HIGH,
            Workflow::Fix,
            estimated,
            "failing-tests",
            summarize("Test run failed", &output),
            Vec::new(),
        )))
    }

    /// Probe 3: defensive type-check, counting `error TS` occurrences.
    pub async fn type_errors(&self) -> Result<Option<Task>, SubprocessError> {
        let output = self.run(&self.commands.typecheck).await?;
        if output.success() {
            return Ok(None);
        }
        let count = output.combined().matches("error TS").count().max(1) as u32;
        let estimated = (5 * count).min(45);
        Ok(Some(self.task(
            format!("Fix {} type error(s)", count),
            TaskType::Bugfix,
            Priority::HIGH,
            Workflow::Fix,
            estimated,
            "type-errors",
            summarize("Type-check failed", &output),
            Vec::new(),
        )))
    }

    /// Probe 4: lint. Extracts mentioned source files from the output.
    pub async fn lint_issues(&self) -> Result<Option<Task>, SubprocessError> {
        let output = self.run(&self.commands.lint).await?;
        if output.success() {
            return Ok(None);
        }
        let combined = output.combined();
        // Longer extensions first so `tsx`/`jsx` are not truncated to `ts`/`js`.
        let files: BTreeSet<PathBuf> = match regex::Regex::new(r"[^\s]+\.(tsx|jsx|ts|js)") {
            Ok(path_re) => combined
                .lines()
                .flat_map(|line| path_re.find_iter(line).collect::<Vec<_>>())
                .map(|m| PathBuf::from(m.as_str()))
                .collect(),
            Err(_) => BTreeSet::new(),
        };

        let estimated = (2 * files.len() as u32).min(30);
        Ok(Some(self.task(
            format!("Fix lint issues in {} file(s)", files.len()),
            TaskType::Refactor,
            Priority::LOW,
            Workflow::Code,
            estimated,
            "lint-issues",
            summarize("Lint failed", &output),
            files.into_iter().collect(),
        )))
    }

    /// Advanced probe: hardcoded secrets, eval, and XSS sinks.
    pub fn security(&self) -> Vec<Task> {
        let secret_re = regex::Regex::new(
            r#"(?i)(api[_-]?key|apikey|secret|password|passwd|token)\s*[:=]\s*["'][^"']{8,}["']"#,
        );
        let eval_re = regex::Regex::new(r"\beval\s*\(|new\s+Function\s*\(");
        let xss_re = regex::Regex::new(r"\.innerHTML\s*=|document\.write\s*\(");
        let (Ok(secret_re), Ok(eval_re), Ok(xss_re)) = (secret_re, eval_re, xss_re) else {
            return Vec::new();
        };

        let mut secret_files = BTreeSet::new();
        let mut sink_files = BTreeSet::new();
        for path in self.source_files() {
            let Ok(text) = std::fs::read_to_string(&path) else { continue };
            if secret_re.is_match(&text) {
                secret_files.insert(path.clone());
            }
            if eval_re.is_match(&text) || xss_re.is_match(&text) {
                sink_files.insert(path);
            }
        }

        let mut tasks = Vec::new();
        if !secret_files.is_empty() {
            tasks.push(self.task(
                format!("Remove hardcoded secrets from {} file(s)", secret_files.len()),
                TaskType::Security,
                Priority::CRITICAL,
                Workflow::Fix,
                (15 * secret_files.len() as u32).min(90),
                "security",
                "Possible hardcoded credentials matched a secret pattern.".to_string(),
                secret_files.into_iter().collect(),
            ));
        }
        if !sink_files.is_empty() {
            tasks.push(self.task(
                format!("Review unsafe eval/XSS sinks in {} file(s)", sink_files.len()),
                TaskType::Security,
                Priority::HIGH,
                Workflow::Fix,
                (10 * sink_files.len() as u32).min(60),
                "security",
                "eval/new Function or innerHTML/document.write usage found.".to_string(),
                sink_files.into_iter().collect(),
            ));
        }
        tasks
    }

    /// Advanced probe: source files over 50 lines without a sibling test.
    pub fn test_coverage(&self) -> Option<Task> {
        let untested: Vec<PathBuf> = self
            .source_files()
            .into_iter()
            .filter(|path| !is_test_file(path))
            .filter(|path| {
                std::fs::read_to_string(path)
                    .map(|text| text.lines().count() > 50)
                    .unwrap_or(false)
            })
            .filter(|path| !has_sibling_test(path))
            .collect();

        if untested.is_empty() {
            return None;
        }
        Some(self.task(
            format!("Add tests for {} uncovered file(s)", untested.len()),
            TaskType::Test,
            Priority::MEDIUM,
            Workflow::Code,
            (10 * untested.len() as u32).min(90),
            "test-coverage",
            "Files longer than 50 lines have no sibling test file.".to_string(),
            untested,
        ))
    }

    /// Advanced probe: long or deeply nested source files.
    pub fn refactoring(&self) -> Option<Task> {
        let mut flagged = Vec::new();
        for path in self.source_files() {
            let Ok(text) = std::fs::read_to_string(&path) else { continue };
            if longest_function_lines(&text) > 50 || max_nesting_depth(&text) > 5 {
                flagged.push(path);
            }
        }
        if flagged.is_empty() {
            return None;
        }
        Some(self.task(
            format!("Refactor {} oversized or deeply nested file(s)", flagged.len()),
            TaskType::Refactor,
            Priority::LOW,
            Workflow::Code,
            (15 * flagged.len() as u32).min(90),
            "refactoring",
            "Functions exceed 50 lines or nesting exceeds 5 levels.".to_string(),
            flagged,
        ))
    }

    /// Advanced probe: exported items with no doc comment above them.
    pub fn documentation(&self) -> Option<Task> {
        let mut gaps = 0usize;
        let mut files = BTreeSet::new();
        for path in self.source_files() {
            let Ok(text) = std::fs::read_to_string(&path) else { continue };
            let lines: Vec<&str> = text.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                let trimmed = line.trim_start();
                let exported = trimmed.starts_with("export function")
                    || trimmed.starts_with("export class")
                    || trimmed.starts_with("export const")
                    || trimmed.starts_with("export async function");
                if !exported {
                    continue;
                }
                let documented = i > 0 && lines[i - 1].trim_end().ends_with("*/");
                if !documented {
                    gaps += 1;
                    files.insert(path.clone());
                }
            }
        }
        if gaps == 0 {
            return None;
        }
        Some(self.task(
            format!("Document {} exported item(s)", gaps),
            TaskType::Docs,
            Priority::LOW,
            Workflow::Code,
            (2 * gaps as u32).min(30),
            "documentation",
            "Exported functions, classes, or consts lack doc comments.".to_string(),
            files.into_iter().collect(),
        ))
    }

    /// Advanced probe: queries or fetches issued inside loops.
    pub fn performance(&self) -> Option<Task> {
        let loop_re = regex::Regex::new(r"\b(for|while)\s*\(|\.forEach\s*\(").ok()?;
        let io_re = regex::Regex::new(r"\bfetch\s*\(|\bquery\s*\(|\.(find|findOne|exec)\s*\(").ok()?;

        let mut flagged = BTreeSet::new();
        for path in self.source_files() {
            let Ok(text) = std::fs::read_to_string(&path) else { continue };
            let lines: Vec<&str> = text.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                if !loop_re.is_match(line) {
                    continue;
                }
                let window = &lines[(i + 1)..lines.len().min(i + 11)];
                let io_calls = window.iter().filter(|l| io_re.is_match(l)).count();
                if io_calls >= 2 {
                    flagged.insert(path.clone());
                    break;
                }
            }
        }
        if flagged.is_empty() {
            return None;
        }
        Some(self.task(
            format!("Batch I/O inside loops in {} file(s)", flagged.len()),
            TaskType::Optimization,
            Priority::MEDIUM,
            Workflow::Code,
            (10 * flagged.len() as u32).min(60),
            "performance",
            "Multiple queries or fetches are issued per loop iteration.".to_string(),
            flagged.into_iter().collect(),
        ))
    }

    /// Recursively collect source files, bounded and with vendored dirs skipped.
    fn source_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut stack = vec![self.cwd.to_path_buf()];
        while let Some(dir) = stack.pop() {
            if files.len() >= MAX_SCANNED_FILES {
                break;
            }
            let Ok(entries) = std::fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    if !SKIP_DIRS.contains(&name.as_ref()) && !name.starts_with('.') {
                        stack.push(path);
                    }
                } else if path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
                {
                    files.push(path);
                    if files.len() >= MAX_SCANNED_FILES {
                        break;
                    }
                }
            }
        }
        files.sort();
        files
    }
}

/// One-line summary plus the head of the command output.
fn summarize(prefix: &str, output: &CommandOutput) -> String {
    let combined = output.combined();
    let head: String = combined.lines().take(12).collect::<Vec<_>>().join("\n");
    let mut text = format!("{} (exit {}).", prefix, output.exit_code);
    if !head.is_empty() {
        text.push('\n');
        text.push_str(&head);
    }
    if text.len() > 800 {
        text.truncate(800);
    }
    text
}

fn is_test_file(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    name.contains(".test.") || name.contains(".spec.")
}

/// Whether `foo.ts` has `foo.test.ts` or `foo.spec.ts` next to it.
fn has_sibling_test(path: &Path) -> bool {
    let (Some(stem), Some(ext), Some(parent)) = (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|e| e.to_str()),
        path.parent(),
    ) else {
        return false;
    };
    parent.join(format!("{}.test.{}", stem, ext)).exists()
        || parent.join(format!("{}.spec.{}", stem, ext)).exists()
}

/// Longest run of lines between a function opener and its closing brace at
/// the same indentation. Brace counting is approximate but stable.
fn longest_function_lines(text: &str) -> usize {
    let mut longest = 0usize;
    let mut depth_at_start: Option<i32> = None;
    let mut depth = 0i32;
    let mut current = 0usize;
    for line in text.lines() {
        let opens = line.matches('{').count() as i32;
        let closes = line.matches('}').count() as i32;
        let is_fn = line.contains("function ")
            || line.contains("=> {")
            || line.trim_start().starts_with("fn ");
        if depth_at_start.is_none() && is_fn && opens > 0 {
            depth_at_start = Some(depth);
            current = 0;
        }
        depth += opens - closes;
        if let Some(start) = depth_at_start {
            current += 1;
            if depth <= start {
                longest = longest.max(current);
                depth_at_start = None;
            }
        }
    }
    longest.max(current)
}

/// Deepest brace nesting seen in the file.
fn max_nesting_depth(text: &str) -> usize {
    let mut depth = 0i32;
    let mut max_depth = 0i32;
    for ch in text.chars() {
        match ch {
            '{' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            '}' => depth -= 1,
            _ => {}
        }
    }
    max_depth.max(0) as usize
}

#[cfg(test)]
#[path = "probes_tests.rs"]
mod tests;
