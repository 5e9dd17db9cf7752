// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport seam between jobs and the broker.

use crate::message::{Message, QoS};
use std::sync::Arc;
use std::time::Duration;

/// Inbound message callback. Runs on the connection's dispatch thread;
/// callbacks must never publish on the connection that invoked them.
pub type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum PubsubError {
    #[error("connection is closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Options for opening one broker connection.
pub struct ConnectOptions {
    pub client_id: String,
    pub keepalive: Duration,
    pub clean_session: bool,
    /// Registered before the TCP connect completes; fired by the broker if
    /// this connection dies without a graceful disconnect.
    pub last_will: Option<Message>,
    /// Invoked after every successful (re)connect. The subscriber side uses
    /// this to republish settings and re-subscribe passive topics.
    pub on_connect: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl ConnectOptions {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keepalive: Duration::from_secs(60),
            clean_session: true,
            last_will: None,
            on_connect: None,
        }
    }

    pub fn keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    pub fn last_will(mut self, will: Message) -> Self {
        self.last_will = Some(will);
        self
    }

    pub fn on_connect(mut self, hook: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.on_connect = Some(hook);
        self
    }
}

/// One live connection to the broker.
pub trait Connection: Send + Sync {
    fn publish(&self, message: Message) -> Result<(), PubsubError>;

    /// Subscribe and attach a callback for messages matching `filter`.
    /// Retained messages matching the filter are replayed with
    /// `retain = true`.
    fn subscribe(&self, filter: &str, qos: QoS, callback: Callback) -> Result<(), PubsubError>;

    /// Graceful disconnect: the last-will is discarded, the dispatch
    /// thread stops. Idempotent.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

/// A broker a connection can be opened against.
pub trait Broker: Send + Sync {
    fn connect(&self, options: ConnectOptions) -> Result<Box<dyn Connection>, PubsubError>;
}
