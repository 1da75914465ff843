// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test helpers shared across crates (behind the `test-support` feature).

/// Proptest strategies for core types.
#[cfg(any(test, feature = "test-support"))]
pub mod strategies {
    use crate::task::{Complexity, Priority, TaskStatus, TaskType, Workflow};
    use proptest::prelude::*;

    pub fn arb_task_type() -> impl Strategy<Value = TaskType> {
        prop_oneof![
            Just(TaskType::Feature),
            Just(TaskType::Bugfix),
            Just(TaskType::Refactor),
            Just(TaskType::Test),
            Just(TaskType::Docs),
            Just(TaskType::Commit),
            Just(TaskType::Security),
            Just(TaskType::Optimization),
            Just(TaskType::Analysis),
            Just(TaskType::Plan),
            Just(TaskType::Other),
            Just(TaskType::Delete),
            Just(TaskType::ForcePush),
            Just(TaskType::Reset),
        ]
    }

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Pending),
            Just(TaskStatus::Executing),
            Just(TaskStatus::Completed),
            Just(TaskStatus::Failed),
            Just(TaskStatus::Cancelled),
        ]
    }

    pub fn arb_complexity() -> impl Strategy<Value = Complexity> {
        prop_oneof![Just(Complexity::Low), Just(Complexity::Medium), Just(Complexity::High)]
    }

    pub fn arb_workflow() -> impl Strategy<Value = Workflow> {
        prop_oneof![
            Just(Workflow::Code),
            Just(Workflow::Fix),
            Just(Workflow::Plan),
            Just(Workflow::Review),
            Just(Workflow::Commit),
            Just(Workflow::Epic),
        ]
    }

    /// Any priority value, in or out of the named tiers but inside the range.
    pub fn arb_priority() -> impl Strategy<Value = Priority> {
        (Priority::TRIVIAL.0..=Priority::CRITICAL.0).prop_map(Priority)
    }
}
