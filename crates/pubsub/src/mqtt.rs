// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MQTT transport over rumqttc.
//!
//! One event-loop thread per connection: it routes inbound publishes to
//! the registered callbacks and replays the reconnect protocol
//! (re-subscribe, then the caller's `on_connect` hook) on every ConnAck.

use crate::broker::{Broker, Callback, ConnectOptions, Connection, PubsubError};
use crate::filter::topic_matches;
use crate::message::{Message, QoS};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// A real MQTT broker, addressed by host and port. The broker normally
/// runs on the leader.
#[derive(Debug, Clone)]
pub struct MqttBroker {
    host: String,
    port: u16,
}

impl MqttBroker {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    pub fn leader(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_MQTT_PORT)
    }
}

fn to_rumqttc_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

type Subscriptions = Arc<Mutex<Vec<(String, QoS, Callback)>>>;

struct MqttConnection {
    client: Mutex<rumqttc::Client>,
    subscriptions: Subscriptions,
    stopped: Arc<AtomicBool>,
}

impl Broker for MqttBroker {
    fn connect(&self, options: ConnectOptions) -> Result<Box<dyn Connection>, PubsubError> {
        let mut mqtt_options =
            rumqttc::MqttOptions::new(options.client_id.clone(), self.host.clone(), self.port);
        mqtt_options.set_keep_alive(options.keepalive);
        mqtt_options.set_clean_session(options.clean_session);
        if let Some(will) = &options.last_will {
            mqtt_options.set_last_will(rumqttc::LastWill::new(
                will.topic.clone(),
                will.payload.clone(),
                to_rumqttc_qos(will.qos),
                will.retain,
            ));
        }

        let (client, mut event_loop) = rumqttc::Client::new(mqtt_options, 64);
        let subscriptions: Subscriptions = Arc::new(Mutex::new(Vec::new()));
        let stopped = Arc::new(AtomicBool::new(false));

        let thread_client = client.clone();
        let thread_subscriptions = Arc::clone(&subscriptions);
        let thread_stopped = Arc::clone(&stopped);
        let on_connect = options.on_connect;
        let client_id = options.client_id;
        std::thread::spawn(move || {
            for event in event_loop.iter() {
                if thread_stopped.load(Ordering::SeqCst) {
                    break;
                }
                match event {
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                        let filters: Vec<(String, QoS)> = thread_subscriptions
                            .lock()
                            .iter()
                            .map(|(filter, qos, _)| (filter.clone(), *qos))
                            .collect();
                        for (filter, qos) in filters {
                            if let Err(e) = thread_client.subscribe(filter, to_rumqttc_qos(qos)) {
                                tracing::debug!(client_id, error = %e, "re-subscribe failed");
                            }
                        }
                        if let Some(hook) = &on_connect {
                            hook();
                        }
                    }
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish))) => {
                        let message = Message {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                            qos: match publish.qos {
                                rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
                                rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
                                rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
                            },
                            retain: publish.retain,
                        };
                        let matching: Vec<Callback> = thread_subscriptions
                            .lock()
                            .iter()
                            .filter(|(filter, _, _)| topic_matches(filter, &message.topic))
                            .map(|(_, _, callback)| Arc::clone(callback))
                            .collect();
                        for callback in matching {
                            callback(&message);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if thread_stopped.load(Ordering::SeqCst) {
                            break;
                        }
                        tracing::debug!(client_id, error = %e, "broker connection error, retrying");
                        std::thread::sleep(Duration::from_secs(1));
                    }
                }
            }
        });

        Ok(Box::new(MqttConnection { client: Mutex::new(client), subscriptions, stopped }))
    }
}

impl Connection for MqttConnection {
    fn publish(&self, message: Message) -> Result<(), PubsubError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(PubsubError::ConnectionClosed);
        }
        self.client
            .lock()
            .publish(message.topic, to_rumqttc_qos(message.qos), message.retain, message.payload)
            .map_err(|e| PubsubError::Transport(e.to_string()))
    }

    fn subscribe(&self, filter: &str, qos: QoS, callback: Callback) -> Result<(), PubsubError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(PubsubError::ConnectionClosed);
        }
        self.subscriptions.lock().push((filter.to_string(), qos, callback));
        self.client
            .lock()
            .subscribe(filter, to_rumqttc_qos(qos))
            .map_err(|e| PubsubError::Transport(e.to_string()))
    }

    fn disconnect(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // a graceful DISCONNECT packet tells the broker to drop the will
        let _ = self.client.lock().disconnect();
    }

    fn is_connected(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
