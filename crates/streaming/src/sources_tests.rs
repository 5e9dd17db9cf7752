// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use pio_pubsub::InProcessBroker;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap()
}

fn batch(offset_secs: i64, ods: &[(&str, f64)]) -> ODReadings {
    let timestamp = base_time() + chrono::Duration::seconds(offset_secs);
    let mut map = BTreeMap::new();
    for (channel, od) in ods {
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
}

#[test]
fn mqtt_od_source_yields_published_batches() {
    let broker = InProcessBroker::new();
    let mut source = MqttODSource::new(&broker, "u1", "e1", 0).unwrap();
    assert!(source.is_live());

    let publisher = broker.client("od-job");
    let sample = batch(0, &[("1", 0.21), ("2", 0.05)]);
    publisher
        .publish_json(&topics::od_readings("u1", "e1"), &sample, QoS::ExactlyOnce, false)
        .unwrap();

    let received = source.next_reading().unwrap();
    assert_eq!(received, sample);
}

#[test]
fn mqtt_od_source_skips_first_batches() {
    let broker = InProcessBroker::new();
    let mut source = MqttODSource::new(&broker, "u1", "e1", 2).unwrap();
    let publisher = broker.client("od-job");
    for i in 0..3 {
        publisher
            .publish_json(
                &topics::od_readings("u1", "e1"),
                &batch(i, &[("1", 0.1 + i as f64)]),
                QoS::ExactlyOnce,
                false,
            )
            .unwrap();
    }
    let received = source.next_reading().unwrap();
    assert_eq!(received.ods["1"].od, 2.1);
}

#[test]
fn stop_signal_terminates_live_sources() {
    let broker = InProcessBroker::new();
    let mut source = MqttODSource::new(&broker, "u1", "e1", 0).unwrap();
    let stop = Latch::new();
    source.set_stop(stop.clone());

    let handle = std::thread::spawn(move || source.next_reading());
    std::thread::sleep(Duration::from_millis(30));
    stop.set();
    assert_eq!(handle.join().ok().flatten(), None);
}

#[test]
fn mqtt_dosing_source_decodes_events() {
    let broker = InProcessBroker::new();
    let mut source = MqttDosingSource::new(&broker, "u1", "e1").unwrap();
    let publisher = broker.client("pump");
    let event = DosingEvent {
        timestamp: base_time(),
        event_name: DosingEventName::AddMedia,
        volume_change: 1.0,
        source_of_event: "turbidostat".to_string(),
    };
    publisher
        .publish_json(&topics::dosing_events("u1", "e1"), &event, QoS::ExactlyOnce, false)
        .unwrap();

    assert_eq!(source.next_event().unwrap(), event);
}

#[test]
fn csv_od_source_batches_rows_by_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("od.csv");
    std::fs::write(
        &path,
        "timestamp,channel,angle,od\n\
         2026-03-01T09:00:00Z,1,90,0.21\n\
         2026-03-01T09:00:00Z,2,REF,0.05\n\
         2026-03-01T09:00:05Z,1,90,0.22\n",
    )
    .unwrap();

    let mut source = CsvODSource::new(&path).unwrap();
    assert!(!source.is_live());

    let first = source.next_reading().unwrap();
    assert_eq!(first.ods.len(), 2);
    assert_eq!(first.ods["2"].angle, PdAngle::Reference);

    let second = source.next_reading().unwrap();
    assert_eq!(second.ods.len(), 1);
    assert_eq!(second.ods["1"].od, 0.22);

    assert!(source.next_reading().is_none());
}

#[test]
fn csv_dosing_source_parses_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dosing.csv");
    std::fs::write(
        &path,
        "timestamp,event_name,volume_change,source_of_event\n\
         2026-03-01T09:00:02Z,add_media,1.5,chemostat\n\
         2026-03-01T09:00:04Z,remove_waste,1.5,chemostat\n",
    )
    .unwrap();

    let mut source = CsvDosingSource::new(&path).unwrap();
    let first = source.next_event().unwrap();
    assert_eq!(first.event_name, DosingEventName::AddMedia);
    assert_eq!(first.volume_change, 1.5);
    let second = source.next_event().unwrap();
    assert_eq!(second.event_name, DosingEventName::RemoveWaste);
    assert!(source.next_event().is_none());
}

#[test]
fn csv_od_source_missing_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let err = CsvODSource::new(&dir.path().join("absent.csv")).unwrap_err();
    assert!(matches!(err, StreamError::Csv { .. }));
}
