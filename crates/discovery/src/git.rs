// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin git queries used for cache keying and safety checks.
//!
//! All helpers degrade to `None` outside a git repository or when git itself
//! fails; callers treat that as "unknown", never as an error.

use crate::subprocess::{run_shell, GIT_TIMEOUT};
use std::path::Path;
use tokio_util::sync::CancellationToken;

async fn git_line(args: &str, cwd: &Path, cancel: &CancellationToken) -> Option<String> {
    let command = format!("git {}", args);
    let output = run_shell(&command, cwd, GIT_TIMEOUT, cancel).await.ok()?;
    if !output.success() {
        return None;
    }
    let line = output.stdout.lines().next()?.trim().to_string();
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

/// Current commit hash, or `None` outside a repository.
pub async fn rev_parse_head(cwd: &Path, cancel: &CancellationToken) -> Option<String> {
    git_line("rev-parse HEAD", cwd, cancel).await
}

/// Current branch name; `None` for detached HEAD or outside a repository.
pub async fn current_branch(cwd: &Path, cancel: &CancellationToken) -> Option<String> {
    git_line("branch --show-current", cwd, cancel).await
}

/// Whether the working tree has uncommitted changes; `None` when unknown.
pub async fn is_dirty(cwd: &Path, cancel: &CancellationToken) -> Option<bool> {
    let output = run_shell("git status --porcelain", cwd, GIT_TIMEOUT, cancel).await.ok()?;
    if !output.success() {
        return None;
    }
    Some(!output.stdout.trim().is_empty())
}

/// Tracked `.env` files, a common secret-leak vector.
pub async fn tracked_env_files(cwd: &Path, cancel: &CancellationToken) -> Vec<String> {
    let Ok(output) = run_shell("git ls-files '*.env'", cwd, GIT_TIMEOUT, cancel).await else {
        return Vec::new();
    };
    if !output.success() {
        return Vec::new();
    }
    output.stdout.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
