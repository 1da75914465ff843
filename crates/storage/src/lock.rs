// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process session mutual exclusion via lockfiles.
//!
//! One lockfile per session under a shared lock directory. The file content
//! is the serialized [`SessionInfo`] of the holder. Liveness is judged by the
//! lockfile's mtime: files older than an hour are presumed abandoned by a
//! crashed process and may be reclaimed.

use parking_lot::Mutex;
use polka_core::{Clock, SessionId, SessionInfo};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Locks older than this are stale and may be reclaimed.
pub const STALE_AFTER_MS: u64 = 3_600_000;

/// Errors from lock acquisition and release.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {op} failed for {path}: {source}")]
    Filesystem {
        path: PathBuf,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("lockfile serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl LockError {
    fn fs(path: &Path, op: &'static str, source: std::io::Error) -> Self {
        Self::Filesystem { path: path.to_path_buf(), op, source }
    }
}

/// Outcome of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// The lock is ours; the written [`SessionInfo`] is returned.
    Acquired(SessionInfo),
    /// Another live session holds the lock.
    Refused {
        reason: String,
        /// The holder's info, when its lockfile was readable.
        existing: Option<SessionInfo>,
    },
}

impl Acquire {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Acquire::Acquired(_))
    }
}

/// Owns the lock directory and an in-process registry of sessions this
/// process acquired. There is no other global registry.
pub struct SessionLock<C: Clock> {
    dir: PathBuf,
    clock: C,
    active: Mutex<HashMap<SessionId, SessionInfo>>,
}

impl<C: Clock> SessionLock<C> {
    pub fn new(dir: impl Into<PathBuf>, clock: C) -> Self {
        Self { dir: dir.into(), clock, active: Mutex::new(HashMap::new()) }
    }

    pub fn lock_path(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.lock", session_id))
    }

    /// Try to take the lock for `session_id`.
    ///
    /// Refuses when this process already holds a fresh lock for the id, or
    /// when another process's lockfile is younger than [`STALE_AFTER_MS`].
    /// Stale lockfiles are deleted and the lock is taken over.
    pub fn acquire(&self, session_id: SessionId) -> Result<Acquire, LockError> {
        let now_ms = self.clock.epoch_ms();

        // In-process registry first: cheapest check, and authoritative for
        // sessions this process owns.
        {
            let active = self.active.lock();
            if let Some(existing) = active.get(&session_id) {
                if existing.age_ms(now_ms) < STALE_AFTER_MS {
                    return Ok(Acquire::Refused {
                        reason: format!("session {} already active in this process", session_id),
                        existing: Some(existing.clone()),
                    });
                }
            }
        }

        let path = self.lock_path(&session_id);
        match self.lockfile_age_ms(&path) {
            Some(age) if age < STALE_AFTER_MS => {
                let existing = self.read_lockfile(&path);
                return Ok(Acquire::Refused {
                    reason: format!("session {} locked by another process", session_id),
                    existing,
                });
            }
            Some(_) => {
                // Stale: the previous holder crashed without cleanup.
                tracing::warn!(path = %path.display(), "reclaiming stale session lock");
                if let Err(e) = std::fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(LockError::fs(&path, "remove stale", e));
                    }
                }
            }
            None => {}
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| LockError::fs(&self.dir, "create dir", e))?;

        let info = SessionInfo::current(session_id, &self.clock);
        let json = serde_json::to_string_pretty(&info).map_err(LockError::Serialize)?;

        // create_new makes the claim atomic: of two racing acquirers exactly
        // one creates the file, the other sees AlreadyExists.
        let mut file = match std::fs::OpenOptions::new().write(true).create_new(true).open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Ok(Acquire::Refused {
                    reason: format!("session {} claimed concurrently", session_id),
                    existing: self.read_lockfile(&path),
                });
            }
            Err(e) => return Err(LockError::fs(&path, "create", e)),
        };
        std::io::Write::write_all(&mut file, json.as_bytes())
            .map_err(|e| LockError::fs(&path, "write", e))?;

        self.active.lock().insert(session_id, info.clone());
        Ok(Acquire::Acquired(info))
    }

    /// Release the lock. Best-effort: a missing file is fine, other removal
    /// failures are logged but not propagated (the stale-lock GC will finish
    /// the job within the hour).
    pub fn release(&self, session_id: &SessionId) {
        self.active.lock().remove(session_id);
        let path = self.lock_path(session_id);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "lockfile removal failed");
            }
        }
    }

    /// Whether a fresh lock exists for `session_id` (in this process or on
    /// disk).
    pub fn is_active(&self, session_id: &SessionId) -> bool {
        let now_ms = self.clock.epoch_ms();
        if let Some(info) = self.active.lock().get(session_id) {
            if info.age_ms(now_ms) < STALE_AFTER_MS {
                return true;
            }
        }
        matches!(self.lockfile_age_ms(&self.lock_path(session_id)), Some(age) if age < STALE_AFTER_MS)
    }

    /// All readable lockfiles in the directory, stale ones included.
    pub fn list(&self) -> Vec<SessionInfo> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "lock") {
                if let Some(info) = self.read_lockfile(&path) {
                    sessions.push(info);
                }
            }
        }
        sessions.sort_by_key(|info| info.start_time);
        sessions
    }

    /// Lockfile age from its mtime; `None` when absent or unstattable.
    fn lockfile_age_ms(&self, path: &Path) -> Option<u64> {
        let modified = std::fs::metadata(path).ok()?.modified().ok()?;
        let age = std::time::SystemTime::now().duration_since(modified).ok()?;
        Some(age.as_millis() as u64)
    }

    /// Read a lockfile's content; unreadable or malformed files are treated
    /// as absent.
    fn read_lockfile(&self, path: &Path) -> Option<SessionInfo> {
        let text = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
