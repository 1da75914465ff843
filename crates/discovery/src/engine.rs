// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovery engine: sequences probes, consults the cache, owns the backoff.

use crate::backoff::Backoff;
use crate::cache::{CacheFile, DiscoveryCache};
use crate::git;
use crate::probes::Prober;
use crate::subprocess::SubprocessError;
use polka_core::{Clock, DiscoveryConfig, DiscoveryStrategy, Task};
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that abort a discovery pass entirely.
///
/// Individual probe failures never surface here; they are logged and the
/// pass continues. Only cancellation stops the engine.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery cancelled")]
    Cancelled,
}

/// Options for one discovery pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoverOptions {
    pub use_cache: bool,
    pub include_advanced: bool,
}

/// Probes project health and emits tasks.
pub struct DiscoveryEngine<C: Clock> {
    cwd: PathBuf,
    config: DiscoveryConfig,
    clock: C,
    cancel: CancellationToken,
    cache: CacheFile,
    backoff: Backoff,
}

impl<C: Clock> DiscoveryEngine<C> {
    pub fn new(
        cwd: impl Into<PathBuf>,
        config: DiscoveryConfig,
        clock: C,
        cancel: CancellationToken,
    ) -> Self {
        let cwd = cwd.into();
        let cache = CacheFile::for_project(&cwd);
        Self { cwd, config, clock, cancel, cache, backoff: Backoff::new() }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn backoff_seconds(&self) -> u64 {
        self.backoff.seconds()
    }

    pub fn increase_backoff(&mut self) {
        self.backoff.increase();
        tracing::debug!(seconds = self.backoff.seconds(), "discovery backoff increased");
    }

    pub fn reset_backoff(&mut self) {
        self.backoff.reset();
    }

    /// Run one discovery pass.
    ///
    /// With `use_cache`, a cache entry keyed to the current git HEAD and
    /// younger than an hour is returned as-is and no probes run.
    pub async fn discover(&self, options: DiscoverOptions) -> Result<Vec<Task>, DiscoveryError> {
        let git_head = git::rev_parse_head(&self.cwd, &self.cancel).await;

        if options.use_cache {
            if let (Some(head), Some(cached)) = (&git_head, self.cache.load()) {
                if cached.is_valid(head, self.clock.epoch_ms()) {
                    tracing::info!(
                        tasks = cached.discovered_tasks.len(),
                        head = %polka_core::short(head, 8),
                        "discovery cache hit"
                    );
                    return Ok(cached.discovered_tasks);
                }
            }
        }

        let tasks = self.run_probes(options).await?;

        // Key the cache to the commit observed at save time; without a git
        // HEAD there is nothing sound to key on.
        if let Some(head) = git_head {
            self.cache.save(&DiscoveryCache {
                git_head: head,
                timestamp: self.clock.epoch_ms(),
                discovered_tasks: tasks.clone(),
            });
        }

        tracing::info!(tasks = tasks.len(), "discovery pass complete");
        Ok(tasks)
    }

    async fn run_probes(&self, options: DiscoverOptions) -> Result<Vec<Task>, DiscoveryError> {
        let prober = Prober {
            cwd: &self.cwd,
            commands: &self.config.commands,
            cancel: &self.cancel,
            now_ms: self.clock.epoch_ms(),
        };

        let mut tasks: Vec<Task> = Vec::new();
        let mut skip_tests = false;
        let mut build_found = false;

        if self.config.is_enabled(DiscoveryStrategy::BuildErrors) {
            match prober.build_errors().await {
                Ok(outcome) => {
                    build_found = !outcome.tasks.is_empty();
                    skip_tests = outcome.skip_tests;
                    tasks.extend(outcome.tasks);
                }
                Err(e) => self.probe_failed("build-errors", e)?,
            }
        }

        if self.config.is_enabled(DiscoveryStrategy::FailingTests) && !skip_tests {
            match prober.failing_tests().await {
                Ok(found) => tasks.extend(found),
                Err(e) => self.probe_failed("failing-tests", e)?,
            }
        }

        // Defensive type pass; skipped when the build probe already reported.
        if self.config.is_enabled(DiscoveryStrategy::TypeErrors) && !build_found {
            match prober.type_errors().await {
                Ok(found) => tasks.extend(found),
                Err(e) => self.probe_failed("type-errors", e)?,
            }
        }

        if self.config.is_enabled(DiscoveryStrategy::LintIssues) {
            match prober.lint_issues().await {
                Ok(found) => tasks.extend(found),
                Err(e) => self.probe_failed("lint-issues", e)?,
            }
        }

        if options.include_advanced {
            if self.cancel.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }
            if self.config.is_enabled(DiscoveryStrategy::Security) {
                tasks.extend(prober.security());
                let env_files = git::tracked_env_files(&self.cwd, &self.cancel).await;
                if !env_files.is_empty() {
                    tasks.push(prober.task(
                        format!("Untrack {} committed .env file(s)", env_files.len()),
                        polka_core::TaskType::Security,
                        polka_core::Priority::CRITICAL,
                        polka_core::Workflow::Fix,
                        10,
                        "security",
                        "Environment files are tracked by git and may leak secrets.".to_string(),
                        env_files.iter().map(Into::into).collect(),
                    ));
                }
            }
            if self.config.is_enabled(DiscoveryStrategy::TestCoverage) {
                tasks.extend(prober.test_coverage());
            }
            if self.config.is_enabled(DiscoveryStrategy::Refactoring) {
                tasks.extend(prober.refactoring());
            }
            if self.config.is_enabled(DiscoveryStrategy::Documentation) {
                tasks.extend(prober.documentation());
            }
            if self.config.is_enabled(DiscoveryStrategy::CodeQuality) {
                tasks.extend(prober.performance());
            }
        }

        Ok(tasks)
    }

    /// A probe that errors is "no finding" for its category; cancellation
    /// aborts the pass.
    fn probe_failed(&self, probe: &str, error: SubprocessError) -> Result<(), DiscoveryError> {
        if error.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }
        tracing::warn!(probe, error = %error, "probe failed, continuing with remaining probes");
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
