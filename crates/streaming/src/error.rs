// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming and estimation errors.

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("both streams must be live or both must be historical")]
    MixedLiveness,

    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("ekf_outlier_std_threshold should not be less than 2.0 - that's eliminating too many data points")]
    OutlierThresholdTooLow,

    #[error("is there an OD reading that is 0? Maybe there's a loose photodiode connection?")]
    ZeroNormalization,

    #[error("OD stream ended before normalization statistics could be computed")]
    ExhaustedDuringNormalization,

    #[error(transparent)]
    Storage(#[from] pio_storage::StorageError),

    #[error(transparent)]
    Pubsub(#[from] pio_pubsub::PubsubError),
}
