// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lockfile payload identifying a live agent session.

use crate::clock::Clock;
use crate::task::SessionId;
use serde::{Deserialize, Serialize};

/// Serialized into the session lockfile so other processes (and humans) can
/// see who holds the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub pid: u32,
    pub ppid: u32,
    /// Epoch milliseconds.
    pub start_time: u64,
    pub hostname: String,
    pub username: String,
}

impl SessionInfo {
    /// Describe the current process as the holder of `session_id`.
    pub fn current(session_id: SessionId, clock: &impl Clock) -> Self {
        Self {
            session_id,
            pid: std::process::id(),
            ppid: parent_pid(),
            start_time: clock.epoch_ms(),
            hostname: crate::state::hostname(),
            username: crate::state::username(),
        }
    }

    /// Age of the session in milliseconds at `now_ms`.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.start_time)
    }
}

/// Parent PID from /proc on Linux; 0 where unavailable.
fn parent_pid() -> u32 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| {
            s.lines()
                .find(|l| l.starts_with("PPid:"))
                .and_then(|l| l.split_whitespace().nth(1).map(str::to_string))
        })
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
