// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps OS signals and unhandled faults to orderly shutdown.
//!
//! The first SIGINT/SIGTERM cancels the root token: loops stop accepting
//! tasks, the executor cancels in-flight workflows, and the caller runs its
//! cleanup sequence. A second signal exits immediately with code 130.
//! Panics anywhere in the process become interrupt-equivalents through a
//! chained panic hook.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Exit code for interrupted runs, mirroring shell convention (128 + SIGINT).
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// Owns the root cancellation token and the interrupted flag.
pub struct InterruptHandler {
    root: CancellationToken,
    interrupted: Arc<AtomicBool>,
    signal_count: Arc<AtomicUsize>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl InterruptHandler {
    /// Install signal listeners and the panic hook.
    ///
    /// Must run inside a tokio runtime.
    pub fn install(root: CancellationToken) -> Self {
        let interrupted = Arc::new(AtomicBool::new(false));
        let signal_count = Arc::new(AtomicUsize::new(0));

        install_panic_hook(root.clone(), Arc::clone(&interrupted));

        let token = root.clone();
        let flag = Arc::clone(&interrupted);
        let count = Arc::clone(&signal_count);
        let handle = tokio::spawn(async move {
            let mut sigint = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::interrupt(),
            ) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::error!(error = %e, "SIGINT handler installation failed");
                    return;
                }
            };
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::error!(error = %e, "SIGTERM handler installation failed");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
                let previous = count.fetch_add(1, Ordering::SeqCst);
                if previous == 0 {
                    tracing::warn!("interrupt received, shutting down (repeat to force exit)");
                    flag.store(true, Ordering::SeqCst);
                    token.cancel();
                } else {
                    tracing::error!("second interrupt, forcing exit");
                    std::process::exit(INTERRUPT_EXIT_CODE);
                }
            }
        });

        Self { root, interrupted, signal_count, handle: Some(handle) }
    }

    /// Build a handler without signal listeners (tests drive it directly).
    pub fn manual(root: CancellationToken) -> Self {
        Self {
            root,
            interrupted: Arc::new(AtomicBool::new(false)),
            signal_count: Arc::new(AtomicUsize::new(0)),
            handle: None,
        }
    }

    /// The root cancellation token all components descend from.
    pub fn root(&self) -> &CancellationToken {
        &self.root
    }

    /// True once an interrupt (or panic) initiated shutdown.
    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Trigger the first-interrupt path programmatically.
    pub fn trigger(&self) {
        self.signal_count.fetch_add(1, Ordering::SeqCst);
        self.interrupted.store(true, Ordering::SeqCst);
        self.root.cancel();
    }
}

impl Drop for InterruptHandler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Chain a panic hook that turns unhandled faults into interrupts.
///
/// The previous hook still runs, so default backtrace printing is kept.
fn install_panic_hook(root: CancellationToken, interrupted: Arc<AtomicBool>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "unhandled fault, initiating shutdown");
        interrupted.store(true, Ordering::SeqCst);
        root.cancel();
        previous(info);
    }));
}

#[cfg(test)]
#[path = "interrupt_tests.rs"]
mod tests;
