// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git-HEAD-keyed memo of the most recent discovery result.
//!
//! The cache degrades gracefully in every direction: a missing, malformed,
//! or unwritable cache file is a cache miss, never an error.

use polka_core::Task;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Cached results expire after an hour even on an unchanged HEAD.
pub const CACHE_TTL_MS: u64 = 3_600_000;

/// The persisted cache document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryCache {
    /// Commit hash observed when the cache was saved.
    pub git_head: String,
    /// Epoch milliseconds at save time.
    pub timestamp: u64,
    pub discovered_tasks: Vec<Task>,
}

impl DiscoveryCache {
    /// Valid iff the HEAD matches and the entry is younger than the TTL.
    pub fn is_valid(&self, git_head: &str, now_ms: u64) -> bool {
        self.git_head == git_head && now_ms.saturating_sub(self.timestamp) < CACHE_TTL_MS
    }
}

/// Cache file under `<cwd>/.polka/cache/discovery-cache.json`.
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    pub fn for_project(cwd: &Path) -> Self {
        Self { path: cwd.join(".polka").join("cache").join("discovery-cache.json") }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cache; any failure is a miss.
    pub fn load(&self) -> Option<DiscoveryCache> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&text) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "discovery cache malformed, ignoring");
                None
            }
        }
    }

    /// Persist the cache; failures are logged and swallowed.
    pub fn save(&self, cache: &DiscoveryCache) {
        let json = match serde_json::to_string_pretty(cache) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "discovery cache serialization failed");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "discovery cache dir creation failed");
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.path, json) {
            tracing::warn!(path = %self.path.display(), error = %e, "discovery cache write failed");
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
