// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution with timeout and cancellation.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default timeout for discovery probe commands.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for quick git queries.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from subprocess execution.
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
    #[error("`{command}` cancelled")]
    Cancelled { command: String },
    #[error("`{command}` produced no exit status: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl SubprocessError {
    /// Cancellation must stay distinguishable from failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SubprocessError::Cancelled { .. })
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout and stderr joined, for probes that scan both.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Run a shell command line in `cwd`, bounded by `timeout` and `cancel`.
///
/// The child is killed when the timeout fires or the token is cancelled;
/// both are reported as distinct errors, never as a fake exit status.
pub async fn run_shell(
    command: &str,
    cwd: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput, SubprocessError> {
    let mut cmd = tokio::process::Command::new("bash");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|source| SubprocessError::Spawn { command: command.to_string(), source })?;

    // Dropping the wait future kills the child via kill_on_drop.
    tokio::select! {
        result = child.wait_with_output() => {
            let output = result
                .map_err(|source| SubprocessError::Wait { command: command.to_string(), source })?;
            Ok(CommandOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        _ = tokio::time::sleep(timeout) => {
            tracing::warn!(%command, ?timeout, "command timed out");
            Err(SubprocessError::TimedOut { command: command.to_string(), timeout })
        }
        _ = cancel.cancelled() => {
            Err(SubprocessError::Cancelled { command: command.to_string() })
        }
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
