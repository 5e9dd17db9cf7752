// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pio-pubsub: the broker contract every job speaks.
//!
//! A job opens two connections: a publisher for all outbound traffic and a
//! subscriber that carries the job's last-will and owns inbound
//! subscriptions. The [`Broker`] trait seams the transport so the real MQTT
//! broker ([`MqttBroker`]) and the in-process broker used by tests
//! ([`InProcessBroker`]) are interchangeable.

pub mod broker;
pub mod client;
pub mod filter;
pub mod message;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod mqtt;

pub use broker::{Broker, Callback, ConnectOptions, Connection, PubsubError};
pub use client::{Client, ClientPair};
pub use filter::topic_matches;
#[cfg(any(test, feature = "test-support"))]
pub use memory::InProcessBroker;
pub use message::{Message, QoS};
pub use mqtt::MqttBroker;
