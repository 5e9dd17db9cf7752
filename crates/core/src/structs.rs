// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain structs exchanged over the broker and persisted to storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A photodiode channel label, e.g. `"1"` or `"2"`.
pub type PdChannel = String;

/// Photodiode angle relative to the IR beam. `REF` is the reference diode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PdAngle {
    #[serde(rename = "45")]
    Angle45,
    #[serde(rename = "90")]
    Angle90,
    #[serde(rename = "135")]
    Angle135,
    #[serde(rename = "180")]
    Angle180,
    #[serde(rename = "REF")]
    Reference,
}

impl std::fmt::Display for PdAngle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PdAngle::Angle45 => "45",
            PdAngle::Angle90 => "90",
            PdAngle::Angle135 => "135",
            PdAngle::Angle180 => "180",
            PdAngle::Reference => "REF",
        })
    }
}

/// One optical-density reading from a single photodiode channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ODReading {
    pub channel: PdChannel,
    pub angle: PdAngle,
    pub od: f64,
    pub timestamp: DateTime<Utc>,
}

/// A single batched OD sample: one reading per channel, sharing a timestamp.
///
/// Channels are keyed in a BTreeMap so iteration order is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ODReadings {
    pub timestamp: DateTime<Utc>,
    pub ods: BTreeMap<PdChannel, ODReading>,
}

/// What a dosing event did to the vial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DosingEventName {
    AddMedia,
    AddAltMedia,
    RemoveWaste,
}

impl std::fmt::Display for DosingEventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DosingEventName::AddMedia => "add_media",
            DosingEventName::AddAltMedia => "add_alt_media",
            DosingEventName::RemoveWaste => "remove_waste",
        })
    }
}

/// A pump event published by a dosing action or automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosingEvent {
    pub timestamp: DateTime<Utc>,
    pub event_name: DosingEventName,
    /// Volume in mL. Always non-negative; the event name carries direction.
    pub volume_change: f64,
    pub source_of_event: String,
}

/// Estimated specific growth rate, in inverse hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthRate {
    pub growth_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// Normalized, blank-subtracted, Kalman-smoothed optical density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ODFiltered {
    pub od_filtered: f64,
    pub timestamp: DateTime<Utc>,
}

/// Full filter state after one update, for downstream diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KalmanFilterOutput {
    /// `[nOD, growth rate]`
    pub state: [f64; 2],
    pub covariance_matrix: [[f64; 2]; 2],
    pub timestamp: DateTime<Utc>,
}

/// A log record as forwarded to `pioreactor/<unit>/<exp>/logs/app`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub message: String,
    pub level: String,
    /// The job or action that emitted the record.
    pub task: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[path = "structs_tests.rs"]
mod tests;
