// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker messages and quality-of-service levels.

use serde::de::DeserializeOwned;

/// MQTT quality-of-service levels.
///
/// State changes and settings use `ExactlyOnce`; bulk telemetry and logs
/// may use `AtLeastOnce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    #[default]
    ExactlyOnce,
}

/// One message on the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    /// On publish: ask the broker to retain. On delivery: true only when
    /// the broker is replaying a retained message to a new subscriber.
    pub retain: bool,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self { topic: topic.into(), payload: payload.into(), qos: QoS::ExactlyOnce, retain: false }
    }

    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Zero-length retained payload: clears the retained topic.
    pub fn clear(topic: impl Into<String>) -> Self {
        Self::new(topic, Vec::new()).retained()
    }

    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub fn payload_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let msg = Message::new("a/b", "x");
        assert_eq!(msg.qos, QoS::ExactlyOnce);
        assert!(!msg.retain);
        assert_eq!(msg.payload_str(), "x");
    }

    #[test]
    fn clear_is_empty_and_retained() {
        let msg = Message::clear("a/b");
        assert!(msg.retain);
        assert!(msg.is_empty());
    }

    #[test]
    fn json_payload_decodes() {
        let msg = Message::new("a", br#"{"x": 2}"#.to_vec());
        let value: serde_json::Value = msg.payload_json().unwrap();
        assert_eq!(value["x"], 2);
    }
}
