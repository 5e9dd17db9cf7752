// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observation sources: live (broker-backed) and historical (CSV).
//!
//! Live sources subscribe on their own connection and queue messages for
//! the consumer; handing them a shared stop signal makes the consumer's
//! disconnection terminate the iteration. Historical sources read export
//! files in timestamp order.

use crate::error::StreamError;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use pio_core::structs::{DosingEvent, DosingEventName, ODReading, ODReadings, PdAngle};
use pio_core::{topics, Latch};
use pio_pubsub::{Broker, Client, ConnectOptions, Message, QoS};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A stream of batched OD samples, in timestamp order.
pub trait ODObservationSource: Send + 'static {
    fn is_live(&self) -> bool;

    /// Live sources stop yielding once the signal is set. No-op for
    /// historical sources.
    fn set_stop(&mut self, _stop: Latch) {}

    /// Next batch, or None when the stream ends (or the stop fires).
    fn next_reading(&mut self) -> Option<ODReadings>;
}

/// A stream of dosing events, in timestamp order.
pub trait DosingObservationSource: Send + 'static {
    fn is_live(&self) -> bool;

    fn set_stop(&mut self, _stop: Latch) {}

    fn next_event(&mut self) -> Option<DosingEvent>;
}

const POLL: Duration = Duration::from_millis(100);

fn live_recv<T>(receiver: &Receiver<T>, stop: &Latch) -> Option<T> {
    loop {
        if stop.is_set() {
            return None;
        }
        match receiver.recv_timeout(POLL) {
            Ok(item) => return Some(item),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

/// Live OD batches off `pioreactor/<unit>/<exp>/od_reading/ods`.
pub struct MqttODSource {
    receiver: Receiver<ODReadings>,
    stop: Latch,
    skip_remaining: usize,
    _client: Client,
}

impl MqttODSource {
    /// `skip_first` drops the first batches, which are often noisy while
    /// the optics settle.
    pub fn new(
        broker: &dyn Broker,
        unit: &str,
        experiment: &str,
        skip_first: usize,
    ) -> Result<Self, StreamError> {
        let client = Client::connect(
            broker,
            ConnectOptions::new(format!("od-source-{unit}-{experiment}")),
        )?;
        let (sender, receiver) = crossbeam_channel::unbounded();
        let topic = topics::od_readings(unit, experiment);
        client.subscribe_and_callback(
            &[topic.as_str()],
            QoS::ExactlyOnce,
            false,
            Arc::new(move |message: &Message| {
                match message.payload_json::<ODReadings>() {
                    Ok(readings) => {
                        let _ = sender.send(readings);
                    }
                    Err(e) => tracing::debug!(error = %e, "undecodable OD payload"),
                }
            }),
        )?;
        Ok(Self { receiver, stop: Latch::new(), skip_remaining: skip_first, _client: client })
    }
}

impl ODObservationSource for MqttODSource {
    fn is_live(&self) -> bool {
        true
    }

    fn set_stop(&mut self, stop: Latch) {
        self.stop = stop;
    }

    fn next_reading(&mut self) -> Option<ODReadings> {
        loop {
            let readings = live_recv(&self.receiver, &self.stop)?;
            if self.skip_remaining > 0 {
                self.skip_remaining -= 1;
                continue;
            }
            return Some(readings);
        }
    }
}

/// Live dosing events off `pioreactor/<unit>/<exp>/dosing_events`.
pub struct MqttDosingSource {
    receiver: Receiver<DosingEvent>,
    stop: Latch,
    _client: Client,
}

impl MqttDosingSource {
    pub fn new(broker: &dyn Broker, unit: &str, experiment: &str) -> Result<Self, StreamError> {
        let client = Client::connect(
            broker,
            ConnectOptions::new(format!("dosing-source-{unit}-{experiment}")),
        )?;
        let (sender, receiver) = crossbeam_channel::unbounded();
        let topic = topics::dosing_events(unit, experiment);
        client.subscribe_and_callback(
            &[topic.as_str()],
            QoS::ExactlyOnce,
            false,
            Arc::new(move |message: &Message| {
                match message.payload_json::<DosingEvent>() {
                    Ok(event) => {
                        let _ = sender.send(event);
                    }
                    Err(e) => tracing::debug!(error = %e, "undecodable dosing payload"),
                }
            }),
        )?;
        Ok(Self { receiver, stop: Latch::new(), _client: client })
    }
}

impl DosingObservationSource for MqttDosingSource {
    fn is_live(&self) -> bool {
        true
    }

    fn set_stop(&mut self, stop: Latch) {
        self.stop = stop;
    }

    fn next_event(&mut self) -> Option<DosingEvent> {
        live_recv(&self.receiver, &self.stop)
    }
}

#[derive(Debug, serde::Deserialize)]
struct OdRow {
    timestamp: DateTime<Utc>,
    channel: String,
    angle: String,
    od: f64,
}

fn parse_angle(angle: &str) -> Option<PdAngle> {
    match angle {
        "45" => Some(PdAngle::Angle45),
        "90" => Some(PdAngle::Angle90),
        "135" => Some(PdAngle::Angle135),
        "180" => Some(PdAngle::Angle180),
        "REF" => Some(PdAngle::Reference),
        _ => None,
    }
}

/// Historical OD batches from a CSV export with columns
/// `timestamp,channel,angle,od`. Rows sharing a timestamp form one batch.
#[derive(Debug)]
pub struct CsvODSource {
    batches: std::vec::IntoIter<ODReadings>,
}

impl CsvODSource {
    pub fn new(path: &Path) -> Result<Self, StreamError> {
        let mut reader = csv::Reader::from_path(path).map_err(|source| StreamError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        let mut batches: Vec<ODReadings> = Vec::new();
        for row in reader.deserialize::<OdRow>() {
            let row = row.map_err(|source| StreamError::Csv {
                path: path.display().to_string(),
                source,
            })?;
            let Some(angle) = parse_angle(&row.angle) else {
                tracing::debug!(angle = row.angle, "skipping row with unknown angle");
                continue;
            };
            let reading = ODReading {
                channel: row.channel.clone(),
                angle,
                od: row.od,
                timestamp: row.timestamp,
            };
            match batches.last_mut() {
                Some(batch) if batch.timestamp == row.timestamp => {
                    batch.ods.insert(row.channel, reading);
                }
                _ => {
                    let mut ods = BTreeMap::new();
                    ods.insert(row.channel, reading);
                    batches.push(ODReadings { timestamp: row.timestamp, ods });
                }
            }
        }
        Ok(Self { batches: batches.into_iter() })
    }
}

impl ODObservationSource for CsvODSource {
    fn is_live(&self) -> bool {
        false
    }

    fn next_reading(&mut self) -> Option<ODReadings> {
        self.batches.next()
    }
}

#[derive(Debug, serde::Deserialize)]
struct DosingRow {
    timestamp: DateTime<Utc>,
    event_name: String,
    volume_change: f64,
    source_of_event: String,
}

/// Historical dosing events from a CSV export with columns
/// `timestamp,event_name,volume_change,source_of_event`.
pub struct CsvDosingSource {
    events: std::vec::IntoIter<DosingEvent>,
}

impl CsvDosingSource {
    pub fn new(path: &Path) -> Result<Self, StreamError> {
        let mut reader = csv::Reader::from_path(path).map_err(|source| StreamError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        let mut events = Vec::new();
        for row in reader.deserialize::<DosingRow>() {
            let row = row.map_err(|source| StreamError::Csv {
                path: path.display().to_string(),
                source,
            })?;
            let event_name = match row.event_name.as_str() {
                "add_media" => DosingEventName::AddMedia,
                "add_alt_media" => DosingEventName::AddAltMedia,
                "remove_waste" => DosingEventName::RemoveWaste,
                other => {
                    tracing::debug!(event = other, "skipping row with unknown dosing event");
                    continue;
                }
            };
            events.push(DosingEvent {
                timestamp: row.timestamp,
                event_name,
                volume_change: row.volume_change,
                source_of_event: row.source_of_event,
            });
        }
        Ok(Self { events: events.into_iter() })
    }
}

impl DosingObservationSource for CsvDosingSource {
    fn is_live(&self) -> bool {
        false
    }

    fn next_event(&mut self) -> Option<DosingEvent> {
        self.events.next()
    }
}

/// In-memory sources for tests and replays.
pub struct VecODSource(pub std::vec::IntoIter<ODReadings>);

impl VecODSource {
    pub fn new(readings: Vec<ODReadings>) -> Self {
        Self(readings.into_iter())
    }
}

impl ODObservationSource for VecODSource {
    fn is_live(&self) -> bool {
        false
    }

    fn next_reading(&mut self) -> Option<ODReadings> {
        self.0.next()
    }
}

pub struct VecDosingSource(pub std::vec::IntoIter<DosingEvent>);

impl VecDosingSource {
    pub fn new(events: Vec<DosingEvent>) -> Self {
        Self(events.into_iter())
    }
}

impl DosingObservationSource for VecDosingSource {
    fn is_live(&self) -> bool {
        false
    }

    fn next_event(&mut self) -> Option<DosingEvent> {
        self.0.next()
    }
}

#[cfg(test)]
#[path = "sources_tests.rs"]
mod tests;
