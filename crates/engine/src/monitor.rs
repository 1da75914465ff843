// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic resource sampling with limit events.
//!
//! A 1 Hz ticker samples process RSS, session wall-clock time, and the
//! longest-running task. Each limit fires exactly once per threshold
//! crossing: after firing, it re-arms only when the sample drops back below
//! the limit.

use polka_core::LimitsConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Which limit a sample exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitKind {
    /// Process RSS, MB.
    Memory,
    /// Session wall-clock, minutes.
    SessionTime,
    /// Longest-running task, minutes.
    TaskTime,
}

polka_core::simple_display! {
    LimitKind {
        Memory => "memory",
        SessionTime => "session-time",
        TaskTime => "task-time",
    }
}

/// Callback invoked on each threshold crossing: `(kind, observed, limit)`.
pub type OnExceeded = Arc<dyn Fn(LimitKind, u64, u64) + Send + Sync>;

/// Supplies the per-task elapsed sample; the executor provides this.
pub type TaskElapsedFn = Arc<dyn Fn() -> Option<Duration> + Send + Sync>;

/// Periodic resource monitor.
pub struct ResourceMonitor {
    shutdown: CancellationToken,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl ResourceMonitor {
    /// Start sampling. The monitor runs until [`stop`](Self::stop) or drop.
    pub fn start(
        limits: LimitsConfig,
        task_elapsed: TaskElapsedFn,
        on_exceeded: OnExceeded,
    ) -> Self {
        Self::start_with_period(limits, task_elapsed, on_exceeded, Duration::from_secs(1))
    }

    /// Start with an explicit sampling period (tests use a short one).
    pub fn start_with_period(
        limits: LimitsConfig,
        task_elapsed: TaskElapsedFn,
        on_exceeded: OnExceeded,
        period: Duration,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            let session_start = Instant::now();
            let mut latched: HashMap<LimitKind, bool> = HashMap::new();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = token.cancelled() => break,
                }

                let mut samples: Vec<(LimitKind, u64, u64)> = Vec::new();
                if let Some(rss_mb) = process_rss_mb() {
                    samples.push((LimitKind::Memory, rss_mb, limits.max_memory_mb));
                }
                let session_minutes = session_start.elapsed().as_secs() / 60;
                samples.push((LimitKind::SessionTime, session_minutes, limits.max_session_minutes));
                if let Some(task) = task_elapsed() {
                    samples.push((LimitKind::TaskTime, task.as_secs() / 60, limits.max_task_minutes));
                }

                for (kind, observed, limit) in samples {
                    let exceeded = observed >= limit && limit > 0;
                    let was_exceeded = latched.get(&kind).copied().unwrap_or(false);
                    if exceeded && !was_exceeded {
                        tracing::warn!(
                            kind = %kind,
                            observed,
                            limit,
                            "resource limit exceeded"
                        );
                        on_exceeded(kind, observed, limit);
                    }
                    latched.insert(kind, exceeded);
                }
            }
        });

        Self { shutdown, handle: Some(handle) }
    }

    /// Stop sampling.
    pub fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resident set size in MB from /proc on Linux; `None` elsewhere.
fn process_rss_mb() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096 / (1024 * 1024))
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
