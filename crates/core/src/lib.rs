// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! polka-core: Core library for the polka autonomous coding agent

pub mod macros;

pub mod clock;
pub mod config;
pub mod id;
pub mod plan;
pub mod session;
pub mod state;
pub mod task;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{iso8601, Clock, FakeClock, SystemClock};
pub use config::{
    AgentConfig, ApprovalConfig, ApprovalLevel, ConfigError, DiscoveryConfig, DiscoveryStrategy,
    LimitsConfig, ProbeCommands, Strategy,
};
pub use id::short;
pub use plan::TaskPlan;
pub use session::SessionInfo;
pub use state::{AgentState, ExecutionRecord, Mode, ModeEvent, Queue, SessionMetadata, StateError};
#[cfg(any(test, feature = "test-support"))]
pub use task::TaskBuilder;
pub use task::{
    Complexity, Priority, SessionId, Task, TaskConfig, TaskConfigBuilder, TaskId, TaskStatus,
    TaskType, Workflow,
};
