// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster-plane errors.

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error(transparent)]
    Storage(#[from] pio_storage::StorageError),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("endpoint must start with /unit_api, got {0:?}")]
    BadEndpoint(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
