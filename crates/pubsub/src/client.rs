// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client wrapper and the per-job publisher/subscriber pair.

use crate::broker::{Broker, Callback, ConnectOptions, Connection, PubsubError};
use crate::message::{Message, QoS};
use pio_core::topics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Keepalive for the publisher connection.
const PUB_KEEPALIVE: Duration = Duration::from_secs(15 * 60);

/// Keepalive for the subscriber connection. Shorter, so a dead job's
/// last-will fires promptly.
const SUB_KEEPALIVE: Duration = Duration::from_secs(125);

/// Convenience wrapper over one connection.
pub struct Client {
    conn: Box<dyn Connection>,
}

impl Client {
    pub fn new(conn: Box<dyn Connection>) -> Self {
        Self { conn }
    }

    pub fn connect(broker: &dyn Broker, options: ConnectOptions) -> Result<Self, PubsubError> {
        Ok(Self::new(broker.connect(options)?))
    }

    pub fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), PubsubError> {
        let mut message = Message::new(topic, payload).with_qos(qos);
        message.retain = retain;
        self.conn.publish(message)
    }

    pub fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        value: &T,
        qos: QoS,
        retain: bool,
    ) -> Result<(), PubsubError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| PubsubError::Transport(format!("encode for {topic}: {e}")))?;
        self.publish(topic, payload, qos, retain)
    }

    /// Publish a zero-length retained payload, clearing the topic.
    pub fn clear_retained(&self, topic: &str) -> Result<(), PubsubError> {
        self.conn.publish(Message::clear(topic))
    }

    /// Subscribe to one or more filters with a shared callback.
    ///
    /// With `allow_retained = false`, replayed retained messages are
    /// swallowed and only fresh messages reach the callback.
    pub fn subscribe_and_callback(
        &self,
        filters: &[&str],
        qos: QoS,
        allow_retained: bool,
        callback: Callback,
    ) -> Result<(), PubsubError> {
        let callback: Callback = if allow_retained {
            callback
        } else {
            Arc::new(move |message: &Message| {
                if !message.retain {
                    callback(message);
                }
            })
        };
        for filter in filters {
            self.conn.subscribe(filter, qos, Arc::clone(&callback))?;
        }
        Ok(())
    }

    pub fn disconnect(&self) {
        self.conn.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }
}

/// The two connections every background job holds.
///
/// Callbacks arrive on the subscriber and must publish via the publisher;
/// the subscriber carries the last-will. On shutdown the subscriber is
/// stopped first so its will cannot fire spuriously, and the publisher,
/// which carries the final `disconnected` state, goes last.
pub struct ClientPair {
    pub publisher: Client,
    pub subscriber: Client,
}

impl ClientPair {
    pub fn publisher_options(unit: &str, experiment: &str, job_name: &str) -> ConnectOptions {
        ConnectOptions::new(format!("{job_name}-pub-{unit}-{experiment}")).keepalive(PUB_KEEPALIVE)
    }

    /// Subscriber options, carrying the job's `lost` last-will.
    pub fn subscriber_options(
        unit: &str,
        experiment: &str,
        job_name: &str,
        on_connect: Arc<dyn Fn() + Send + Sync>,
    ) -> ConnectOptions {
        let will = Message::new(topics::state(unit, experiment, job_name), "lost")
            .with_qos(QoS::ExactlyOnce)
            .retained();
        ConnectOptions::new(format!("{job_name}-sub-{unit}-{experiment}"))
            .keepalive(SUB_KEEPALIVE)
            .clean_session(false)
            .last_will(will)
            .on_connect(on_connect)
    }

    /// Disconnect both sides in the contract's order. Idempotent.
    pub fn shutdown(&self) {
        self.subscriber.disconnect();
        self.publisher.disconnect();
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
