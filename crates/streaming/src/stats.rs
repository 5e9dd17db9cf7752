// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OD normalization statistics.

use crate::error::StreamError;
use crate::sources::ODObservationSource;
use std::collections::BTreeMap;

/// Per-channel mean and variance of the first `n_samples` batches.
///
/// Welford's algorithm, so a long baseline does not lose precision.
/// Errors if the stream ends early.
pub fn od_statistics<O: ODObservationSource>(
    source: &mut O,
    n_samples: usize,
) -> Result<(BTreeMap<String, f64>, BTreeMap<String, f64>), StreamError> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut means: BTreeMap<String, f64> = BTreeMap::new();
    let mut m2s: BTreeMap<String, f64> = BTreeMap::new();

    for _ in 0..n_samples {
        let Some(readings) = source.next_reading() else {
            return Err(StreamError::ExhaustedDuringNormalization);
        };
        for (channel, reading) in &readings.ods {
            let count = counts.entry(channel.clone()).or_insert(0);
            *count += 1;
            let mean = means.entry(channel.clone()).or_insert(0.0);
            let delta = reading.od - *mean;
            *mean += delta / *count as f64;
            let delta2 = reading.od - *mean;
            *m2s.entry(channel.clone()).or_insert(0.0) += delta * delta2;
        }
    }

    let variances = m2s
        .into_iter()
        .map(|(channel, m2)| {
            let count = counts.get(&channel).copied().unwrap_or(1).max(2);
            (channel, m2 / (count - 1) as f64)
        })
        .collect();
    Ok((means, variances))
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
