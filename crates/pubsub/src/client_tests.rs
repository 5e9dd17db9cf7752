// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::memory::InProcessBroker;
use parking_lot::Mutex;

#[test]
fn client_ids_follow_the_pair_convention() {
    let options = ClientPair::publisher_options("u1", "e1", "stirring");
    assert_eq!(options.client_id, "stirring-pub-u1-e1");
    assert_eq!(options.keepalive, PUB_KEEPALIVE);
    assert!(options.last_will.is_none());

    let options = ClientPair::subscriber_options("u1", "e1", "stirring", Arc::new(|| {}));
    assert_eq!(options.client_id, "stirring-sub-u1-e1");
    assert!(!options.clean_session);
    let will = options.last_will.unwrap();
    assert_eq!(will.topic, "pioreactor/u1/e1/stirring/$state");
    assert_eq!(will.payload, b"lost");
    assert!(will.retain);
    assert_eq!(will.qos, QoS::ExactlyOnce);
}

#[test]
fn publish_json_encodes() {
    let broker = InProcessBroker::new();
    let client = broker.client("c");
    client
        .publish_json(
            "t/json",
            &serde_json::json!({"growth_rate": 0.2}),
            QoS::AtLeastOnce,
            true,
        )
        .unwrap();
    let retained = broker.retained_str("t/json").unwrap();
    assert!(retained.contains("growth_rate"));
}

#[test]
fn clear_retained_removes_topic() {
    let broker = InProcessBroker::new();
    let client = broker.client("c");
    client.publish("t/a", "x", QoS::ExactlyOnce, true).unwrap();
    assert!(broker.retained("t/a").is_some());
    client.clear_retained("t/a").unwrap();
    assert!(broker.retained("t/a").is_none());
}

#[test]
fn pair_shutdown_is_idempotent_and_will_free() {
    let broker = InProcessBroker::new();
    let publisher =
        Client::connect(&broker, ClientPair::publisher_options("u", "e", "stirring")).unwrap();
    let subscriber = Client::connect(
        &broker,
        ClientPair::subscriber_options("u", "e", "stirring", Arc::new(|| {})),
    )
    .unwrap();
    let pair = ClientPair { publisher, subscriber };

    pair.shutdown();
    pair.shutdown();
    assert!(!pair.subscriber.is_connected());
    assert!(!pair.publisher.is_connected());
    // a graceful shutdown never fires the will
    assert!(broker.retained("pioreactor/u/e/stirring/$state").is_none());
}

#[test]
fn publish_after_disconnect_errors() {
    let broker = InProcessBroker::new();
    let client = broker.client("c");
    client.disconnect();
    let err = client.publish("t/a", "x", QoS::ExactlyOnce, false).unwrap_err();
    assert!(matches!(err, PubsubError::ConnectionClosed));
}

#[test]
fn messages_ordered_within_one_connection() {
    let broker = InProcessBroker::new();
    let sub = broker.client("sub");
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&seen);
    sub.subscribe_and_callback(
        &["seq/#"],
        QoS::ExactlyOnce,
        true,
        Arc::new(move |m: &Message| sink.lock().push(m.payload_str().into_owned())),
    )
    .unwrap();

    let publisher = broker.client("pub");
    for i in 0..20 {
        publisher.publish("seq/t", i.to_string(), QoS::ExactlyOnce, false).unwrap();
    }
    for _ in 0..200 {
        if seen.lock().len() == 20 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    assert_eq!(seen.lock().clone(), expected);
}
