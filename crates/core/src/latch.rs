// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A shareable, resettable wait event.
//!
//! Jobs block on one of these until clean-up (`block_until_disconnected`),
//! live streams carry one as their stop signal, and the dodging scheduler
//! uses one to make its wait window interruptible.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    flag: Mutex<bool>,
    cond: Condvar,
}

/// Clones share state: setting one handle wakes every waiter.
#[derive(Clone, Default)]
pub struct Latch {
    inner: Arc<Inner>,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut flag = self.inner.flag.lock();
        *flag = true;
        self.inner.cond.notify_all();
    }

    /// Reset to unset. Waiters already woken stay woken.
    pub fn clear(&self) {
        *self.inner.flag.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.inner.flag.lock()
    }

    /// Block until set.
    pub fn wait(&self) {
        let mut flag = self.inner.flag.lock();
        while !*flag {
            self.inner.cond.wait(&mut flag);
        }
    }

    /// Block until set or the timeout elapses. Returns true if set.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.inner.flag.lock();
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                return *flag;
            }
            self.inner.cond.wait_for(&mut flag, deadline - now);
        }
        true
    }
}
