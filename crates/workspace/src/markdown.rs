// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Markdown rendering and tolerant parsing for working-space files.
//!
//! The emitted shape is fixed (`# Task: <title>`, `**Key:** value` lines,
//! `## Section` lists) but the parser accepts what humans actually write:
//! headers at any level, case-insensitive field names, backticked or plain
//! values, and `-`/`*`/numbered list items.

use polka_core::{
    iso8601, Complexity, Priority, Task, TaskConfig, TaskId, TaskPlan, TaskStatus, TaskType,
    Workflow,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from interpreting a parsed document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document has no title header")]
    NoTitle,
}

/// One `## Section` block: free text and/or list items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub text: String,
    pub items: Vec<String>,
}

/// Tolerantly parsed markdown document.
#[derive(Debug, Clone, Default)]
pub struct MarkdownDoc {
    /// Lowercased kind from the title header (`task`, `plan`), if present.
    pub kind: String,
    pub title: String,
    /// Lowercased field name → value.
    pub fields: HashMap<String, String>,
    pub sections: Vec<Section>,
}

impl MarkdownDoc {
    /// Parse a working-space markdown file.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut doc = MarkdownDoc::default();
        let mut saw_title = false;
        let mut current: Option<Section> = None;

        for raw in text.lines() {
            let line = raw.trim_end();
            if let Some(header) = header_text(line) {
                if !saw_title {
                    saw_title = true;
                    let (kind, title) = split_kind(header);
                    doc.kind = kind;
                    doc.title = title;
                } else {
                    if let Some(section) = current.take() {
                        doc.sections.push(section);
                    }
                    current = Some(Section {
                        name: header.trim_end_matches(':').trim().to_lowercase(),
                        ..Section::default()
                    });
                }
                continue;
            }

            if let Some((key, value)) = field_line(line) {
                doc.fields.entry(key).or_insert(value);
                continue;
            }

            if let Some(item) = list_item(line) {
                if let Some(section) = current.as_mut() {
                    section.items.push(item);
                }
                continue;
            }

            let trimmed = line.trim();
            if !trimmed.is_empty() {
                if let Some(section) = current.as_mut() {
                    if !section.text.is_empty() {
                        section.text.push('\n');
                    }
                    section.text.push_str(trimmed);
                }
            }
        }
        if let Some(section) = current.take() {
            doc.sections.push(section);
        }

        if !saw_title {
            return Err(ParseError::NoTitle);
        }
        Ok(doc)
    }

    /// Section lookup by case-insensitive name.
    pub fn section(&self, name: &str) -> Option<&Section> {
        let lower = name.to_lowercase();
        self.sections.iter().find(|s| s.name == lower)
    }

    /// Field lookup by case-insensitive name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Header text at any level H1-H6, or `None`.
fn header_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    rest.strip_prefix(' ').map(str::trim).filter(|s| !s.is_empty())
}

/// Split `Task: Fix the build` into `("task", "Fix the build")`.
fn split_kind(header: &str) -> (String, String) {
    match header.split_once(':') {
        Some((kind, title)) if !kind.trim().is_empty() && !title.trim().is_empty() => {
            (kind.trim().to_lowercase(), title.trim().to_string())
        }
        _ => (String::new(), header.trim().to_string()),
    }
}

/// Parse `**Key:** value` / `*Key:* value` lines, tolerating backticks.
fn field_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if !trimmed.starts_with('*') {
        return None;
    }
    let stripped = trimmed.trim_start_matches('*');
    let (key, rest) = stripped.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.len() > 40 {
        return None;
    }
    let value = rest.trim_start_matches('*').trim().trim_matches('`').trim();
    Some((key.to_lowercase(), value.to_string()))
}

/// Parse `- item`, `* item`, and `1. item` list lines.
fn list_item(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let rest = if let Some(rest) = trimmed.strip_prefix("- ") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("* ") {
        rest
    } else {
        let digits = trimmed.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        trimmed[digits..].strip_prefix(". ")?
    };
    Some(rest.trim().trim_matches('`').trim().to_string())
}

/// Render a task as working-space markdown.
pub fn render_task(task: &Task) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Task: {}\n\n", task.title));
    out.push_str(&format!("**Id:** `{}`\n", task.id));
    out.push_str(&format!("**Type:** {}\n", task.task_type));
    out.push_str(&format!("**Status:** {}\n", task.status));
    out.push_str(&format!("**Priority:** {}\n", task.priority.value()));
    out.push_str(&format!("**Complexity:** {}\n", task.complexity));
    out.push_str(&format!("**Workflow:** {}\n", task.workflow));
    out.push_str(&format!("**Estimated:** {} minutes\n", task.estimated_time));
    out.push_str(&format!("**Created:** {}\n", iso8601(task.created_at)));

    if !task.description.is_empty() {
        out.push_str("\n## Description\n\n");
        out.push_str(&task.description);
        out.push('\n');
    }
    if !task.dependencies.is_empty() {
        out.push_str("\n## Dependencies\n\n");
        for dep in &task.dependencies {
            out.push_str(&format!("- `{}`\n", dep));
        }
    }
    if !task.files.is_empty() {
        out.push_str("\n## Files\n\n");
        for file in &task.files {
            out.push_str(&format!("- `{}`\n", file.display()));
        }
    }
    out
}

/// Interpret a parsed document as a task.
///
/// Missing or unparseable scalar fields fall back to sensible defaults so a
/// hand-written file still round-trips into a usable task.
pub fn task_from_doc(doc: &MarkdownDoc) -> Task {
    let task_type =
        doc.field("type").and_then(TaskType::parse).unwrap_or(TaskType::Other);
    let priority = doc
        .field("priority")
        .and_then(|v| v.parse::<i32>().ok().map(Priority).or_else(|| Priority::from_name(v)))
        .unwrap_or(Priority::MEDIUM)
        .clamped();
    let complexity =
        doc.field("complexity").and_then(Complexity::parse).unwrap_or(Complexity::Medium);
    let workflow = doc
        .field("workflow")
        .and_then(Workflow::parse)
        .unwrap_or_else(|| Workflow::for_task_type(task_type));
    let estimated_time = doc
        .field("estimated")
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
        .unwrap_or(15);
    let created_at = doc
        .field("created")
        .and_then(|v| chrono::DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.timestamp_millis() as u64)
        .unwrap_or(0);

    let dependencies = doc
        .section("dependencies")
        .map(|s| s.items.iter().map(TaskId::from_string).collect())
        .unwrap_or_default();
    let files = doc
        .section("files")
        .map(|s| s.items.iter().map(Into::into).collect())
        .unwrap_or_default();
    let description = doc.section("description").map(|s| s.text.clone()).unwrap_or_default();

    let config = TaskConfig::builder(doc.title.clone(), task_type)
        .id(doc.field("id").map(TaskId::from_string).unwrap_or_else(TaskId::generate))
        .description(description)
        .priority(priority)
        .complexity(complexity)
        .estimated_time(estimated_time)
        .workflow(workflow)
        .dependencies(dependencies)
        .files(files)
        .build();
    let mut task = Task::new_with_epoch_ms(config, created_at);
    task.status = doc
        .field("status")
        .and_then(TaskStatus::parse)
        .unwrap_or(TaskStatus::Pending);
    task
}

/// Render a plan as working-space markdown.
pub fn render_plan(plan: &TaskPlan) -> String {
    let mut out = String::new();
    let goal = plan.goal.as_deref().unwrap_or("continuous improvement");
    out.push_str(&format!("# Plan: {}\n\n", goal));
    out.push_str(&format!("**Tasks:** {}\n", plan.tasks.len()));
    out.push_str(&format!("**Phases:** {}\n", plan.phase_count()));
    out.push_str(&format!("**Estimated:** {} minutes\n", plan.estimated_time));

    if !plan.high_level_plan.is_empty() {
        out.push_str("\n## Description\n\n");
        out.push_str(&plan.high_level_plan);
        out.push('\n');
    }
    if !plan.risks.is_empty() {
        out.push_str("\n## Risks\n\n");
        for risk in &plan.risks {
            out.push_str(&format!("- {}\n", risk));
        }
    }
    if !plan.execution_order.is_empty() {
        out.push_str("\n## Execution Order\n\n");
        for (i, phase) in plan.execution_order.iter().enumerate() {
            let ids: Vec<&str> = phase.iter().map(|id| id.as_str()).collect();
            out.push_str(&format!("{}. {}\n", i + 1, ids.join(", ")));
        }
    }
    out
}

/// Interpret a parsed document as a plan projection.
///
/// Task bodies are not stored in plan files, so `tasks` is empty; the
/// execution order carries the scheduled IDs.
pub fn plan_from_doc(doc: &MarkdownDoc) -> TaskPlan {
    let execution_order = doc
        .section("execution order")
        .map(|s| {
            s.items
                .iter()
                .map(|item| {
                    item.split(',')
                        .map(|id| TaskId::from_string(id.trim().trim_matches('`')))
                        .collect()
                })
                .collect()
        })
        .unwrap_or_default();
    let risks = doc.section("risks").map(|s| s.items.clone()).unwrap_or_default();
    let estimated_time = doc
        .field("estimated")
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    TaskPlan {
        goal: Some(doc.title.clone()),
        high_level_plan: doc.section("description").map(|s| s.text.clone()).unwrap_or_default(),
        tasks: Vec::new(),
        execution_order,
        estimated_time,
        risks,
        dependencies: HashMap::new(),
    }
}

/// Append a `## Result` section and completion footer to rendered markdown.
pub fn append_result(content: &str, result: &str, completed_at_ms: u64) -> String {
    let mut out = content.trim_end().to_string();
    out.push_str("\n\n## Result\n\n");
    out.push_str(result.trim());
    out.push_str(&format!("\n\n*Completed:* {}\n", iso8601(completed_at_ms)));
    out
}

#[cfg(test)]
#[path = "markdown_tests.rs"]
mod tests;
