// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pluggable workflow invoker.
//!
//! Workflows (code generation, bug fixing, review, committing) are opaque to
//! the core: the invoker receives a workflow name and an input payload and
//! reports success or failure plus any produced artifacts. Implementations
//! must honor the cancellation token at their suspension points and be safe
//! to call concurrently up to the configured limit.

use async_trait::async_trait;
use polka_core::Workflow;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors an invoker may raise instead of returning an outcome.
#[derive(Debug, Error)]
pub enum InvokerError {
    #[error("workflow {workflow} invocation failed: {message}")]
    Invocation { workflow: Workflow, message: String },
    #[error("workflow {workflow} cancelled")]
    Cancelled { workflow: Workflow },
}

impl InvokerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InvokerError::Cancelled { .. })
    }
}

/// One workflow invocation.
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub workflow: Workflow,
    /// Opaque payload; the core never inspects it.
    pub input: serde_json::Value,
}

/// Structured failure inside a completed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowFailure {
    pub message: String,
    pub kind: String,
}

/// Result of a completed invocation.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOutcome {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<WorkflowFailure>,
    /// Free-form textual output (logs, summaries).
    pub output: Option<String>,
}

impl WorkflowOutcome {
    pub fn ok() -> Self {
        Self { success: true, ..Self::default() }
    }

    pub fn ok_with_data(data: serde_json::Value) -> Self {
        Self { success: true, data: Some(data), ..Self::default() }
    }

    pub fn failed(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(WorkflowFailure { message: message.into(), kind: kind.into() }),
            ..Self::default()
        }
    }

    /// One-line failure summary for logs and results.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

/// External collaborator that performs workflows.
#[async_trait]
pub trait WorkflowInvoker: Send + Sync + 'static {
    async fn invoke(
        &self,
        request: WorkflowRequest,
        cancel: CancellationToken,
    ) -> Result<WorkflowOutcome, InvokerError>;
}

/// Production invoker that shells out to a configured command.
///
/// The command receives the workflow name in `POLKA_WORKFLOW` and the JSON
/// input payload in `POLKA_INPUT`. Exit 0 is success; stdout that parses as
/// JSON becomes the outcome data, anything else is kept as textual output.
pub struct ProcessInvoker {
    command: String,
    cwd: std::path::PathBuf,
}

impl ProcessInvoker {
    pub fn new(command: impl Into<String>, cwd: impl Into<std::path::PathBuf>) -> Self {
        Self { command: command.into(), cwd: cwd.into() }
    }
}

#[async_trait]
impl WorkflowInvoker for ProcessInvoker {
    async fn invoke(
        &self,
        request: WorkflowRequest,
        cancel: CancellationToken,
    ) -> Result<WorkflowOutcome, InvokerError> {
        let mut cmd = tokio::process::Command::new("bash");
        cmd.arg("-c")
            .arg(&self.command)
            .current_dir(&self.cwd)
            .env("POLKA_WORKFLOW", request.workflow.to_string())
            .env("POLKA_INPUT", request.input.to_string())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| InvokerError::Invocation {
            workflow: request.workflow,
            message: format!("spawn failed: {}", e),
        })?;

        let output = tokio::select! {
            result = child.wait_with_output() => result.map_err(|e| InvokerError::Invocation {
                workflow: request.workflow,
                message: format!("wait failed: {}", e),
            })?,
            _ = cancel.cancelled() => {
                return Err(InvokerError::Cancelled { workflow: request.workflow });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            let data = serde_json::from_str(&stdout).ok();
            let text = if data.is_some() { None } else { Some(stdout) };
            Ok(WorkflowOutcome { success: true, data, error: None, output: text })
        } else {
            let message = stderr
                .lines()
                .last()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or("workflow command failed")
                .to_string();
            Ok(WorkflowOutcome {
                success: false,
                data: None,
                error: Some(WorkflowFailure {
                    message,
                    kind: format!("exit {}", output.status.code().unwrap_or(-1)),
                }),
                output: Some(stdout),
            })
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{InvokerError, WorkflowInvoker, WorkflowOutcome, WorkflowRequest};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use polka_core::Workflow;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Recorded invocation.
    #[derive(Debug, Clone)]
    pub struct InvokerCall {
        pub workflow: Workflow,
        pub input: serde_json::Value,
    }

    struct FakeState {
        calls: Vec<InvokerCall>,
        scripted: VecDeque<WorkflowOutcome>,
        delay: Duration,
    }

    /// Fake invoker for tests: scripted outcomes, recorded calls, optional
    /// delay so cancellation and timeout paths can be exercised.
    #[derive(Clone)]
    pub struct FakeInvoker {
        inner: Arc<Mutex<FakeState>>,
    }

    impl Default for FakeInvoker {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeState {
                    calls: Vec::new(),
                    scripted: VecDeque::new(),
                    delay: Duration::ZERO,
                })),
            }
        }
    }

    impl FakeInvoker {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the outcome for the next unscripted invocation (FIFO).
        /// With the queue empty, invocations succeed with no data.
        pub fn push_outcome(&self, outcome: WorkflowOutcome) {
            self.inner.lock().scripted.push_back(outcome);
        }

        pub fn push_failure(&self, message: impl Into<String>) {
            self.push_outcome(WorkflowOutcome::failed(message, "scripted"));
        }

        /// Delay every invocation; used to test cancellation and timeout.
        pub fn set_delay(&self, delay: Duration) {
            self.inner.lock().delay = delay;
        }

        /// All recorded invocations in order.
        pub fn calls(&self) -> Vec<InvokerCall> {
            self.inner.lock().calls.clone()
        }

        pub fn call_count(&self) -> usize {
            self.inner.lock().calls.len()
        }
    }

    #[async_trait]
    impl WorkflowInvoker for FakeInvoker {
        async fn invoke(
            &self,
            request: WorkflowRequest,
            cancel: CancellationToken,
        ) -> Result<WorkflowOutcome, InvokerError> {
            let (delay, outcome) = {
                let mut state = self.inner.lock();
                state
                    .calls
                    .push(InvokerCall { workflow: request.workflow, input: request.input });
                let outcome = state.scripted.pop_front().unwrap_or_else(WorkflowOutcome::ok);
                (state.delay, outcome)
            };

            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(InvokerError::Cancelled { workflow: request.workflow });
                    }
                }
            } else if cancel.is_cancelled() {
                return Err(InvokerError::Cancelled { workflow: request.workflow });
            }

            Ok(outcome)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeInvoker, InvokerCall};

#[cfg(test)]
#[path = "invoker_tests.rs"]
mod tests;
