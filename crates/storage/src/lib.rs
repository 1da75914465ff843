// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! polka-storage: persistent state, execution history, and session locking

pub mod history;
pub mod lock;
pub mod store;

pub use history::{EstimationAccuracy, TaskHistory};
pub use lock::{Acquire, LockError, SessionLock, STALE_AFTER_MS};
pub use store::{StateStore, StoreError};
