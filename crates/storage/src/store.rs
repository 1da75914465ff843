// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safe persistence for the agent state document.
//!
//! Saves go through write-temp-fsync-rename so a crash mid-write leaves
//! either the previous document or the new one, never a partial mix. Each
//! successful save first copies the previous good file to `state.bak`, which
//! `load` falls back to when `state.json` fails to parse or violates the
//! document invariants.

use parking_lot::Mutex;
use polka_core::{AgentState, StateError};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const STATE_FILE: &str = "state.json";
const TEMP_FILE: &str = "state.tmp";
const BACKUP_FILE: &str = "state.bak";

/// Errors from state persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state {op} failed for {path}: {source}")]
    Filesystem {
        path: PathBuf,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("state serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("no state document exists yet")]
    NoState,
    #[error(transparent)]
    State(#[from] StateError),
}

impl StoreError {
    fn fs(path: &Path, op: &'static str, source: std::io::Error) -> Self {
        Self::Filesystem { path: path.to_path_buf(), op, source }
    }
}

/// Persistent, immutable-update store for [`AgentState`].
///
/// Mutators are serialized behind a process-local lock; each one receives an
/// owned copy of the current document and its result replaces it atomically.
pub struct StateStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl StateStore {
    /// Store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), write_lock: Mutex::new(()) }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(TEMP_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE)
    }

    /// Load the current state.
    ///
    /// Returns `Ok(None)` when no document exists, or when both the primary
    /// and the backup are unreadable (the corruption is logged and the caller
    /// starts fresh).
    pub fn load(&self) -> Result<Option<AgentState>, StoreError> {
        match self.read_document(&self.state_path()) {
            Ok(Some(state)) => return Ok(Some(state)),
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, "state document unreadable, trying checkpoint");
            }
        }

        match self.read_document(&self.backup_path()) {
            Ok(Some(state)) => {
                tracing::warn!("recovered state from last known-good checkpoint");
                Ok(Some(state))
            }
            Ok(None) => {
                tracing::error!("state corrupted and no checkpoint exists, starting fresh");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(error = %e, "state and checkpoint both corrupted, starting fresh");
                Ok(None)
            }
        }
    }

    /// Read and validate one document. `Ok(None)` means the file is absent.
    fn read_document(&self, path: &Path) -> Result<Option<AgentState>, StoreError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::fs(path, "read", e)),
        };
        let state: AgentState = serde_json::from_str(&text).map_err(StoreError::Serialize)?;
        state.validate()?;
        Ok(Some(state))
    }

    /// Atomically persist `state`, checkpointing the previous good document.
    pub fn save(&self, state: &AgentState) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        self.save_locked(state)
    }

    fn save_locked(&self, state: &AgentState) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StoreError::fs(&self.dir, "create dir", e))?;

        let json = serde_json::to_string_pretty(state).map_err(StoreError::Serialize)?;

        let temp = self.temp_path();
        let mut file =
            std::fs::File::create(&temp).map_err(|e| StoreError::fs(&temp, "create", e))?;
        file.write_all(json.as_bytes()).map_err(|e| StoreError::fs(&temp, "write", e))?;
        file.sync_all().map_err(|e| StoreError::fs(&temp, "fsync", e))?;
        drop(file);

        // Preserve the previous good document before it is replaced.
        let state_path = self.state_path();
        if state_path.exists() {
            std::fs::copy(&state_path, self.backup_path())
                .map_err(|e| StoreError::fs(&state_path, "checkpoint", e))?;
        }

        std::fs::rename(&temp, &state_path).map_err(|e| StoreError::fs(&temp, "rename", e))?;
        Ok(())
    }

    /// Atomic read-modify-write. The mutator receives an owned copy of the
    /// current document; its return value becomes the new document.
    pub fn update<F>(&self, mutator: F) -> Result<AgentState, StoreError>
    where
        F: FnOnce(AgentState) -> AgentState,
    {
        let _guard = self.write_lock.lock();
        let current = self.load()?.ok_or(StoreError::NoState)?;
        let next = mutator(current);
        self.save_locked(&next)?;
        Ok(next)
    }

    /// Fallible read-modify-write; the document is only replaced when the
    /// mutator succeeds.
    pub fn try_update<F>(&self, mutator: F) -> Result<AgentState, StoreError>
    where
        F: FnOnce(&mut AgentState) -> Result<(), StateError>,
    {
        let _guard = self.write_lock.lock();
        let mut state = self.load()?.ok_or(StoreError::NoState)?;
        mutator(&mut state)?;
        self.save_locked(&state)?;
        Ok(state)
    }

    /// Move a task between queues, persisting the result.
    pub fn move_task(
        &self,
        id: &polka_core::TaskId,
        from: polka_core::Queue,
        to: polka_core::Queue,
    ) -> Result<AgentState, StoreError> {
        self.try_update(|state| state.move_task(id, from, to))
    }

    /// Copy the current document to the checkpoint file.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let state_path = self.state_path();
        if !state_path.exists() {
            return Ok(());
        }
        std::fs::copy(&state_path, self.backup_path())
            .map_err(|e| StoreError::fs(&state_path, "checkpoint", e))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
