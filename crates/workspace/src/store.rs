// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem operations for the working space.
//!
//! ```text
//! <root>/
//!   plans/<slug>.md
//!   tasks/pending/<taskId-slug>.md
//!   tasks/completed/<taskId-slug>.md
//!   logs/
//! ```

use crate::markdown::{
    append_result, plan_from_doc, render_plan, render_task, task_from_doc, MarkdownDoc,
};
use crate::slug::{slugify, MAX_SLUG_LEN};
use polka_core::{Clock, Task, TaskPlan};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from working-space filesystem operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("working space {op} failed for {path}: {source}")]
    Filesystem {
        path: PathBuf,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    fn fs(path: &Path, op: &'static str, source: std::io::Error) -> Self {
        Self::Filesystem { path: path.to_path_buf(), op, source }
    }
}

/// Counts reported by [`WorkingSpace::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkspaceStats {
    pub plans: usize,
    pub pending_tasks: usize,
    pub completed_tasks: usize,
}

/// Markdown-backed mirror of plans and tasks for human interop.
pub struct WorkingSpace<C: Clock> {
    root: PathBuf,
    clock: C,
}

impl<C: Clock> WorkingSpace<C> {
    pub fn new(root: impl Into<PathBuf>, clock: C) -> Self {
        Self { root: root.into(), clock }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn plans_dir(&self) -> PathBuf {
        self.root.join("plans")
    }

    fn pending_dir(&self) -> PathBuf {
        self.root.join("tasks").join("pending")
    }

    fn completed_dir(&self) -> PathBuf {
        self.root.join("tasks").join("completed")
    }

    /// Create the directory layout.
    pub fn initialize(&self) -> Result<(), WorkspaceError> {
        for dir in
            [self.plans_dir(), self.pending_dir(), self.completed_dir(), self.root.join("logs")]
        {
            std::fs::create_dir_all(&dir).map_err(|e| WorkspaceError::fs(&dir, "create dir", e))?;
        }
        Ok(())
    }

    fn task_filename(task: &Task) -> String {
        let slug = slugify(&task.title, MAX_SLUG_LEN);
        if slug.is_empty() {
            format!("{}.md", task.id)
        } else {
            format!("{}-{}.md", task.id, slug)
        }
    }

    /// Write a plan file named after the goal's slug.
    pub fn save_plan(&self, plan: &TaskPlan) -> Result<PathBuf, WorkspaceError> {
        self.initialize()?;
        let goal = plan.goal.as_deref().unwrap_or("continuous-improvement");
        let mut slug = slugify(goal, MAX_SLUG_LEN);
        if slug.is_empty() {
            slug = "plan".to_string();
        }
        let path = self.plans_dir().join(format!("{}.md", slug));
        std::fs::write(&path, render_plan(plan))
            .map_err(|e| WorkspaceError::fs(&path, "write", e))?;
        Ok(path)
    }

    /// Parse every readable plan file, skipping malformed ones.
    pub fn load_plans(&self) -> Result<Vec<TaskPlan>, WorkspaceError> {
        Ok(self
            .read_markdown_docs(&self.plans_dir())?
            .iter()
            .map(plan_from_doc)
            .collect())
    }

    /// Mirror a task into `tasks/pending/`.
    pub fn create_pending_task(&self, task: &Task) -> Result<PathBuf, WorkspaceError> {
        self.initialize()?;
        let path = self.pending_dir().join(Self::task_filename(task));
        std::fs::write(&path, render_task(task))
            .map_err(|e| WorkspaceError::fs(&path, "write", e))?;
        Ok(path)
    }

    /// Parse every pending task file, including ones a human dropped in.
    pub fn discover_pending_tasks(&self) -> Result<Vec<Task>, WorkspaceError> {
        Ok(self
            .read_markdown_docs(&self.pending_dir())?
            .iter()
            .map(task_from_doc)
            .collect())
    }

    /// Move a task's file to `tasks/completed/` and append the result.
    ///
    /// The pending file is renamed when possible; when the rename fails (or
    /// no pending file exists) the completed file is written from scratch.
    pub fn document_completed_task(
        &self,
        task: &Task,
        result: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        self.initialize()?;
        let completed = self.completed_dir().join(Self::task_filename(task));

        let pending = self.find_pending_file(task);
        let content = match &pending {
            Some(path) => match std::fs::rename(path, &completed) {
                Ok(()) => std::fs::read_to_string(&completed)
                    .unwrap_or_else(|_| render_task(task)),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "pending rename failed, writing completed file directly"
                    );
                    std::fs::read_to_string(path).unwrap_or_else(|_| render_task(task))
                }
            },
            None => render_task(task),
        };

        let documented = append_result(&content, result, self.clock.epoch_ms());
        std::fs::write(&completed, documented)
            .map_err(|e| WorkspaceError::fs(&completed, "write", e))?;

        // The rename may have failed; drop the pending copy if it lingers.
        if let Some(path) = pending {
            if path.exists() {
                let _ = std::fs::remove_file(&path);
            }
        }
        Ok(completed)
    }

    /// Locate the pending file for a task by its ID prefix.
    fn find_pending_file(&self, task: &Task) -> Option<PathBuf> {
        let entries = std::fs::read_dir(self.pending_dir()).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(task.id.as_str()) && name.ends_with(".md") {
                return Some(entry.path());
            }
        }
        None
    }

    /// Counts of plans and task files.
    pub fn stats(&self) -> WorkspaceStats {
        WorkspaceStats {
            plans: count_markdown(&self.plans_dir()),
            pending_tasks: count_markdown(&self.pending_dir()),
            completed_tasks: count_markdown(&self.completed_dir()),
        }
    }

    /// Delete completed-task files beyond the newest `keep_n`.
    ///
    /// Returns how many files were removed.
    pub fn cleanup_old_completed_tasks(&self, keep_n: usize) -> Result<usize, WorkspaceError> {
        let dir = self.completed_dir();
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Ok(0);
        };
        let mut files: Vec<(std::time::SystemTime, PathBuf)> = entries
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
            .filter_map(|e| {
                let modified = e.metadata().ok()?.modified().ok()?;
                Some((modified, e.path()))
            })
            .collect();
        files.sort_by(|a, b| b.0.cmp(&a.0));

        let mut removed = 0;
        for (_, path) in files.into_iter().skip(keep_n) {
            std::fs::remove_file(&path).map_err(|e| WorkspaceError::fs(&path, "remove", e))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Parse all `.md` files in `dir`, skipping unreadable or malformed ones.
    fn read_markdown_docs(&self, dir: &Path) -> Result<Vec<MarkdownDoc>, WorkspaceError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkspaceError::fs(dir, "read dir", e)),
        };
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();

        let mut docs = Vec::new();
        for path in paths {
            let Ok(text) = std::fs::read_to_string(&path) else {
                tracing::warn!(path = %path.display(), "working-space file unreadable, skipping");
                continue;
            };
            match MarkdownDoc::parse(&text) {
                Ok(doc) => docs.push(doc),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "working-space file malformed, skipping");
                }
            }
        }
        Ok(docs)
    }
}

fn count_markdown(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
                .count()
        })
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
