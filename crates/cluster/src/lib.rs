// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pio-cluster: the leader's fan-out plane and the HTTP surfaces.
//!
//! Workers expose `/unit_api` (spawn, stop, update, query, delayed task
//! results); the leader mirrors those under `/api/workers/<unit>/…` by
//! dispatching, keeps the cluster inventory, and resolves `$broadcast`
//! to the active workers of an experiment. Per-worker failures in a
//! fan-out are isolated: a failing unit reports `null`, never an error.

pub mod api;
pub mod capabilities;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod resolve;
pub mod spawn;
pub mod tasks;
pub mod unit_api;

pub use api::{leader_router, LeaderState};
pub use dispatch::ClusterDispatcher;
pub use error::ClusterError;
pub use inventory::{Inventory, WorkerEntry};
pub use resolve::resolve_to_address;
pub use tasks::{TaskStatus, TaskStore};
pub use unit_api::{unit_api_router, UnitApiState};
