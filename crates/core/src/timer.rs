// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repeating timer thread for scheduled job work.
//!
//! Jobs use this for periodic activity that must be pausable (the OD
//! dodging window) and cancellable (clean-up). The callback runs on a
//! dedicated thread; `cancel` never joins, so it is safe to call from
//! inside the callback itself.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct TimerState {
    paused: bool,
    cancelled: bool,
    started: bool,
}

struct Shared {
    interval: Duration,
    state: Mutex<TimerState>,
    cond: Condvar,
    callback: Box<dyn Fn() + Send + Sync>,
}

impl Shared {
    /// Wait for `duration` or until cancelled. Returns true if cancelled.
    fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.state.lock();
        loop {
            if guard.cancelled {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return guard.cancelled;
            }
            self.cond.wait_for(&mut guard, deadline - now);
        }
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }
}

/// A repeating timer: runs a callback every `interval`, with optional
/// initial delay and an optional immediate first run.
pub struct RepeatedTimer {
    shared: Arc<Shared>,
    run_immediately: bool,
    run_after: Duration,
}

impl RepeatedTimer {
    pub fn new(interval: Duration, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                interval,
                state: Mutex::new(TimerState::default()),
                cond: Condvar::new(),
                callback: Box::new(callback),
            }),
            run_immediately: false,
            run_after: Duration::ZERO,
        }
    }

    /// Run the callback once as soon as the timer starts (after any
    /// `run_after` delay), rather than waiting one interval first.
    pub fn run_immediately(mut self, yes: bool) -> Self {
        self.run_immediately = yes;
        self
    }

    /// Delay the first activity by `delay`.
    pub fn run_after(mut self, delay: Duration) -> Self {
        self.run_after = delay;
        self
    }

    /// Spawn the timer thread. Idempotent.
    pub fn start(self) -> Self {
        {
            let mut guard = self.shared.state.lock();
            if guard.started {
                drop(guard);
                return self;
            }
            guard.started = true;
        }
        let shared = Arc::clone(&self.shared);
        let run_immediately = self.run_immediately;
        let run_after = self.run_after;
        std::thread::spawn(move || {
            if !run_after.is_zero() && shared.wait(run_after) {
                return;
            }
            if shared.is_cancelled() {
                return;
            }
            if run_immediately && !shared.is_paused() {
                (shared.callback)();
            }
            loop {
                if shared.wait(shared.interval) {
                    return;
                }
                if shared.is_paused() {
                    continue;
                }
                (shared.callback)();
                if shared.is_cancelled() {
                    return;
                }
            }
        });
        self
    }

    /// Skip callback runs until unpaused. The schedule keeps ticking.
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
    }

    pub fn unpause(&self) {
        self.shared.state.lock().paused = false;
    }

    /// Stop the timer thread. Safe to call from the callback; never joins.
    pub fn cancel(&self) {
        let mut guard = self.shared.state.lock();
        guard.cancelled = true;
        self.shared.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }
}

impl Drop for RepeatedTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
