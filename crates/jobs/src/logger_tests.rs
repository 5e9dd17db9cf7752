// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use pio_core::structs::LogRecord;
use pio_pubsub::{Client, InProcessBroker, Message};
use std::time::Duration;

fn collect_logs(broker: &InProcessBroker) -> (Client, Arc<Mutex<Vec<LogRecord>>>) {
    let records: Arc<Mutex<Vec<LogRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    let listener = broker.client("log-listener");
    listener
        .subscribe_and_callback(
            &["pioreactor/+/+/logs/app"],
            QoS::AtLeastOnce,
            true,
            Arc::new(move |m: &Message| {
                if let Ok(record) = m.payload_json::<LogRecord>() {
                    sink.lock().push(record);
                }
            }),
        )
        .unwrap();
    (listener, records)
}

fn wait_for_records(records: &Arc<Mutex<Vec<LogRecord>>>, n: usize) {
    for _ in 0..100 {
        if records.lock().len() >= n {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn records_are_forwarded_with_level_task_and_source() {
    let broker = InProcessBroker::new();
    let (_listener, records) = collect_logs(&broker);
    let publisher = Arc::new(broker.client("pub"));
    let logger = JobLogger::new("u1", "e1", "stirring", "app", Some(publisher));

    logger.info("Ready.");
    logger.warning("rpm low");

    wait_for_records(&records, 2);
    let records = records.lock();
    assert_eq!(records[0].level, "INFO");
    assert_eq!(records[0].message, "Ready.");
    assert_eq!(records[0].task, "stirring");
    assert_eq!(records[0].source, "app");
    assert_eq!(records[1].level, "WARNING");
}

#[test]
fn local_only_logger_publishes_nothing() {
    let broker = InProcessBroker::new();
    let (_listener, records) = collect_logs(&broker);
    let logger = JobLogger::new("u1", "e1", "stirring", "app", None);
    logger.error("kept local");
    std::thread::sleep(Duration::from_millis(50));
    assert!(records.lock().is_empty());
}

#[test]
fn log_level_dispatches_by_name() {
    let broker = InProcessBroker::new();
    let (_listener, records) = collect_logs(&broker);
    let publisher = Arc::new(broker.client("pub"));
    let logger = JobLogger::new("u1", "e1", "cli", "user", Some(publisher));

    logger.log_level("debug", "a");
    logger.log_level("ERROR", "b");
    logger.log_level("notice", "c");

    wait_for_records(&records, 3);
    let levels: Vec<String> = records.lock().iter().map(|r| r.level.clone()).collect();
    assert_eq!(levels, vec!["DEBUG", "ERROR", "INFO"]);
}
