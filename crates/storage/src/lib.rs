// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pio-storage: node-local persistence.
//!
//! Each node owns one SQLite database for the Job Manager (the registry
//! of every job run on this node and its published settings) and two
//! key-value stores: an intermittent one wiped at boot and a persistent
//! one that survives reboots.

pub mod kv;
pub mod manager;
pub mod paths;

pub use kv::{local_intermittent_storage, local_persistent_storage, KvStore};
pub use manager::{JobManager, JobRecord, KillFilter, SettingRecord, StorageError};
pub use paths::DataDir;
