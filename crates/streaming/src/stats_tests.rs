// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::sources::VecODSource;
use chrono::TimeZone;
use pio_core::structs::{ODReading, ODReadings, PdAngle};

fn batches(values: &[&[(&str, f64)]]) -> VecODSource {
    let base = chrono::Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap();
    let readings = values
        .iter()
        .enumerate()
        .map(|(i, ods)| {
            let timestamp = base + chrono::Duration::seconds(i as i64 * 5);
            let mut map = std::collections::BTreeMap::new();
            for (channel, od) in ods.iter() {
                map.insert(
                    channel.to_string(),
                    ODReading {
                        channel: channel.to_string(),
                        angle: PdAngle::Angle90,
                        od: *od,
                        timestamp,
                    },
                );
            }
            ODReadings { timestamp, ods: map }
        })
        .collect();
    VecODSource::new(readings)
}

#[test]
fn means_and_variances_per_channel() {
    let mut source = batches(&[
        &[("1", 1.0), ("2", 2.0)],
        &[("1", 2.0), ("2", 2.0)],
        &[("1", 3.0), ("2", 2.0)],
    ]);
    let (means, variances) = od_statistics(&mut source, 3).unwrap();
    assert_eq!(means["1"], 2.0);
    assert_eq!(means["2"], 2.0);
    assert!((variances["1"] - 1.0).abs() < 1e-12);
    assert_eq!(variances["2"], 0.0);
}

#[test]
fn consumes_only_the_requested_samples() {
    let mut source = batches(&[&[("1", 1.0)], &[("1", 3.0)], &[("1", 100.0)]]);
    let (means, _) = od_statistics(&mut source, 2).unwrap();
    assert_eq!(means["1"], 2.0);
    // the third batch is still available for the consumer
    assert_eq!(source.next_reading().unwrap().ods["1"].od, 100.0);
}

#[test]
fn short_stream_errors() {
    let mut source = batches(&[&[("1", 1.0)]]);
    let err = od_statistics(&mut source, 5).unwrap_err();
    assert!(matches!(err, StreamError::ExhaustedDuringNormalization));
}
