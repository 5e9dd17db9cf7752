// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merge operators over OD and dosing streams.
//!
//! Live streams interleave by arrival (first-ready wins) and stop when
//! the shared stop signal fires. Historical streams merge
//! deterministically by timestamp, OD first on ties.

use crate::error::StreamError;
use crate::sources::{DosingObservationSource, ODObservationSource};
use pio_core::structs::{DosingEvent, ODReadings};
use pio_core::Latch;

/// One element of a merged stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Od(ODReadings),
    Dosing(DosingEvent),
}

impl StreamEvent {
    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        match self {
            StreamEvent::Od(readings) => readings.timestamp,
            StreamEvent::Dosing(event) => event.timestamp,
        }
    }
}

/// Interleave two live streams by arrival. Both inputs must be live.
///
/// Each source is drained on its own thread into a shared channel; the
/// iteration ends when the stop signal fires (sources stop yielding) and
/// both feeder threads exit.
pub fn merge_live_streams<O, D>(
    mut od: O,
    mut dosing: D,
    stop: Latch,
) -> Result<impl Iterator<Item = StreamEvent>, StreamError>
where
    O: ODObservationSource,
    D: DosingObservationSource,
{
    if !od.is_live() || !dosing.is_live() {
        return Err(StreamError::MixedLiveness);
    }
    od.set_stop(stop.clone());
    dosing.set_stop(stop);

    let (sender, receiver) = crossbeam_channel::unbounded::<StreamEvent>();
    let od_sender = sender.clone();
    std::thread::spawn(move || {
        while let Some(readings) = od.next_reading() {
            if od_sender.send(StreamEvent::Od(readings)).is_err() {
                break;
            }
        }
    });
    std::thread::spawn(move || {
        while let Some(event) = dosing.next_event() {
            if sender.send(StreamEvent::Dosing(event)).is_err() {
                break;
            }
        }
    });

    Ok(receiver.into_iter())
}

/// Deterministic, stable merge of two historical streams by timestamp.
/// On a tie the OD reading comes first. Both inputs must be historical.
pub fn merge_historical_streams<O, D>(
    od: O,
    dosing: D,
) -> Result<HistoricalMerge<O, D>, StreamError>
where
    O: ODObservationSource,
    D: DosingObservationSource,
{
    if od.is_live() || dosing.is_live() {
        return Err(StreamError::MixedLiveness);
    }
    Ok(HistoricalMerge { od, dosing, next_od: None, next_dosing: None, primed: false })
}

pub struct HistoricalMerge<O, D> {
    od: O,
    dosing: D,
    next_od: Option<ODReadings>,
    next_dosing: Option<DosingEvent>,
    primed: bool,
}

impl<O, D> Iterator for HistoricalMerge<O, D>
where
    O: ODObservationSource,
    D: DosingObservationSource,
{
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        if !self.primed {
            self.next_od = self.od.next_reading();
            self.next_dosing = self.dosing.next_event();
            self.primed = true;
        }
        match (&self.next_od, &self.next_dosing) {
            (None, None) => None,
            (Some(_), None) => {
                let readings = self.next_od.take()?;
                self.next_od = self.od.next_reading();
                Some(StreamEvent::Od(readings))
            }
            (None, Some(_)) => {
                let event = self.next_dosing.take()?;
                self.next_dosing = self.dosing.next_event();
                Some(StreamEvent::Dosing(event))
            }
            (Some(od), Some(dosing)) => {
                if od.timestamp <= dosing.timestamp {
                    let readings = self.next_od.take()?;
                    self.next_od = self.od.next_reading();
                    Some(StreamEvent::Od(readings))
                } else {
                    let event = self.next_dosing.take()?;
                    self.next_dosing = self.dosing.next_event();
                    Some(StreamEvent::Dosing(event))
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
