// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide signal-handler stack.
//!
//! Several jobs can live in one process; SIGTERM/SIGINT/SIGHUP must run
//! every job's clean-up, newest first. Handlers are installed once per
//! process; jobs register a cleanup on construction and deregister it
//! during clean-up. After SIGTERM or SIGHUP the process exits following a
//! short drain so broker disconnects can flush.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

type Cleanup = Box<dyn Fn() + Send + Sync>;

/// An ordered stack of cleanup callbacks, drained LIFO.
pub struct CleanupStack {
    entries: Mutex<Vec<(u64, Cleanup)>>,
    next_id: AtomicU64,
}

impl CleanupStack {
    pub const fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()), next_id: AtomicU64::new(1) }
    }

    /// Push a cleanup; returns a token for deregistration.
    pub fn register(&self, cleanup: impl Fn() + Send + Sync + 'static) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().push((id, Box::new(cleanup)));
        id
    }

    pub fn deregister(&self, id: u64) {
        self.entries.lock().retain(|(registered, _)| *registered != id);
    }

    /// Drain the stack, newest registration first. Callbacks run outside
    /// the lock so they may register or deregister others.
    pub fn run(&self) {
        loop {
            let Some((_, cleanup)) = self.entries.lock().pop() else { break };
            cleanup();
        }
    }
}

impl Default for CleanupStack {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_STACK: CleanupStack = CleanupStack::new();
static INSTALLED: OnceLock<()> = OnceLock::new();

/// Register on the process-wide stack, installing the signal handlers on
/// first use. Returns a token for [`deregister_cleanup`].
pub fn register_cleanup(cleanup: impl Fn() + Send + Sync + 'static) -> u64 {
    install_handlers();
    GLOBAL_STACK.register(cleanup)
}

pub fn deregister_cleanup(id: u64) {
    GLOBAL_STACK.deregister(id);
}

fn install_handlers() {
    INSTALLED.get_or_init(|| {
        let signals = [
            signal_hook::consts::SIGTERM,
            signal_hook::consts::SIGINT,
            signal_hook::consts::SIGHUP,
        ];
        match signal_hook::iterator::Signals::new(signals) {
            Ok(mut signals) => {
                std::thread::spawn(move || {
                    for signal in signals.forever() {
                        tracing::debug!(signal, "exiting caused by signal");
                        GLOBAL_STACK.run();
                        if signal == signal_hook::consts::SIGTERM
                            || signal == signal_hook::consts::SIGHUP
                        {
                            // drain: let clean-up threads flush disconnects
                            std::thread::sleep(Duration::from_secs(1));
                            std::process::exit(0);
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not install signal handlers");
            }
        }
    });
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
