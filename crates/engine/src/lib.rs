// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! polka-engine: planning, prioritization, execution, and the orchestrator
//!
//! The engine ties the leaf crates together: it decomposes goals into tasks,
//! schedules them into phases, gates them through safety and approval, runs
//! them through the pluggable workflow invoker under cancellation and
//! timeout, and drives either the goal-directed state machine or the
//! continuous-improvement loop.

pub mod continuous;
pub mod decomposer;
pub mod executor;
pub mod interrupt;
pub mod invoker;
pub mod monitor;
pub mod orchestrator;
pub mod planner;
pub mod prioritizer;
pub mod safety;

pub use continuous::{ContinuousLoop, LoopStats};
pub use decomposer::{DecomposeError, Decomposition, GoalDecomposer};
pub use executor::{ExecutionOutcome, Executor};
pub use interrupt::InterruptHandler;
#[cfg(any(test, feature = "test-support"))]
pub use invoker::{FakeInvoker, InvokerCall};
pub use invoker::{
    InvokerError, ProcessInvoker, WorkflowInvoker, WorkflowOutcome, WorkflowRequest,
};
pub use monitor::{LimitKind, ResourceMonitor};
pub use orchestrator::{GoalRunSummary, Orchestrator, OrchestratorError};
pub use planner::create_plan;
pub use prioritizer::Prioritizer;
pub use safety::{is_safe, ApprovalManager, CheckAction, SafetyCheck};
