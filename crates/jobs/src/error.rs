// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job runtime errors.

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// A duplicate would contend for retained topics and hardware.
    #[error("{job_name} is already running (job_id={job_id}). Skipping.")]
    JobPresent { job_name: String, job_id: i64 },

    #[error("{unit} is not an active worker. Make it active on the leader, or set ACTIVE=1 in the environment.")]
    NotActiveWorker { unit: String },

    #[error("job name not allowed: {0:?}")]
    BadJobName(String),

    /// The dodging math is infeasible under the current configuration.
    #[error("insufficient time budget: interval={interval}, od_duration={od_duration}, pre_delay={pre_delay}, post_delay={post_delay}, after_action={after_action}")]
    DodgingTiming {
        interval: f64,
        od_duration: f64,
        pre_delay: f64,
        post_delay: f64,
        after_action: f64,
    },

    #[error(transparent)]
    Settings(#[from] pio_core::SettingsError),

    #[error(transparent)]
    Storage(#[from] pio_storage::StorageError),

    #[error(transparent)]
    Pubsub(#[from] pio_pubsub::PubsubError),

    /// A behavior's own initialization failed.
    #[error("{0}")]
    Behavior(String),
}
