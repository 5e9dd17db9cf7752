// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process broker with full retention and last-will semantics.
//!
//! Used by every integration test in the workspace in place of a real
//! MQTT broker. Behaviour matches what the runtime relies on: retained
//! messages are replayed to new subscribers with `retain = true`, fresh
//! deliveries have `retain = false`, a zero-length retained payload clears
//! the topic, and a connection dropped without a graceful disconnect fires
//! its last-will.

use crate::broker::{Broker, Callback, ConnectOptions, Connection, PubsubError};
use crate::client::Client;
use crate::filter::topic_matches;
use crate::message::{Message, QoS};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Core {
    retained: Mutex<BTreeMap<String, Message>>,
    connections: Mutex<HashMap<u64, Registration>>,
    next_id: AtomicU64,
}

struct Registration {
    client_id: String,
    sender: crossbeam_channel::Sender<Message>,
    filters: Vec<String>,
    will: Option<Message>,
}

impl Core {
    /// Record retention and deliver to every matching subscriber.
    fn route(&self, message: Message) {
        if message.retain {
            let mut retained = self.retained.lock();
            if message.payload.is_empty() {
                retained.remove(&message.topic);
            } else {
                retained.insert(message.topic.clone(), message.clone());
            }
        }
        // a routed message is "fresh": the retain flag is only set when
        // replaying retained state to a new subscriber
        let delivery = Message { retain: false, ..message };
        let connections = self.connections.lock();
        for registration in connections.values() {
            if registration.filters.iter().any(|f| topic_matches(f, &delivery.topic)) {
                let _ = registration.sender.send(delivery.clone());
            }
        }
    }

    /// Remove a connection; fire its will when the drop was not graceful.
    fn remove(&self, id: u64, graceful: bool) {
        let registration = self.connections.lock().remove(&id);
        if let Some(registration) = registration {
            if !graceful {
                if let Some(will) = registration.will {
                    self.route(will);
                }
            }
        }
    }
}

/// Shared in-process broker. Clones share state.
#[derive(Clone, Default)]
pub struct InProcessBroker {
    core: Arc<Core>,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current retained payload on a topic, if any.
    pub fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.core.retained.lock().get(topic).map(|m| m.payload.clone())
    }

    /// Retained payload decoded as UTF-8, for test assertions.
    pub fn retained_str(&self, topic: &str) -> Option<String> {
        self.retained(topic).map(|p| String::from_utf8_lossy(&p).into_owned())
    }

    /// Simulate a crash of the named client: the connection is torn down
    /// without a graceful disconnect, so its last-will fires.
    pub fn drop_abruptly(&self, client_id: &str) -> bool {
        let id = {
            let connections = self.core.connections.lock();
            connections.iter().find(|(_, r)| r.client_id == client_id).map(|(id, _)| *id)
        };
        match id {
            Some(id) => {
                self.core.remove(id, false);
                true
            }
            None => false,
        }
    }

    /// One-shot publish from an anonymous client (tests acting as the UI).
    pub fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>, retain: bool) {
        let mut message = Message::new(topic, payload);
        message.retain = retain;
        self.core.route(message);
    }

    /// Open a wrapped client connection for tests.
    pub fn client(&self, client_id: &str) -> Client {
        // connect on the in-process broker cannot fail
        match Client::connect(self, ConnectOptions::new(client_id)) {
            Ok(client) => client,
            Err(_) => unreachable!("in-process connect is infallible"),
        }
    }
}

struct MemoryConnection {
    id: u64,
    core: Arc<Core>,
    callbacks: Arc<Mutex<Vec<(String, Callback)>>>,
    sender: Mutex<Option<crossbeam_channel::Sender<Message>>>,
    disconnected: AtomicBool,
}

impl Broker for InProcessBroker {
    fn connect(&self, options: ConnectOptions) -> Result<Box<dyn Connection>, PubsubError> {
        let id = self.core.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = crossbeam_channel::unbounded::<Message>();

        let callbacks: Arc<Mutex<Vec<(String, Callback)>>> = Arc::new(Mutex::new(Vec::new()));
        let dispatch_callbacks = Arc::clone(&callbacks);
        std::thread::spawn(move || {
            for message in receiver.iter() {
                let matching: Vec<Callback> = dispatch_callbacks
                    .lock()
                    .iter()
                    .filter(|(filter, _)| topic_matches(filter, &message.topic))
                    .map(|(_, callback)| Arc::clone(callback))
                    .collect();
                for callback in matching {
                    callback(&message);
                }
            }
        });

        self.core.connections.lock().insert(
            id,
            Registration {
                client_id: options.client_id,
                sender: sender.clone(),
                filters: Vec::new(),
                will: options.last_will,
            },
        );

        if let Some(hook) = options.on_connect {
            hook();
        }

        Ok(Box::new(MemoryConnection {
            id,
            core: Arc::clone(&self.core),
            callbacks,
            sender: Mutex::new(Some(sender)),
            disconnected: AtomicBool::new(false),
        }))
    }
}

impl Connection for MemoryConnection {
    fn publish(&self, message: Message) -> Result<(), PubsubError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(PubsubError::ConnectionClosed);
        }
        self.core.route(message);
        Ok(())
    }

    fn subscribe(&self, filter: &str, _qos: QoS, callback: Callback) -> Result<(), PubsubError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(PubsubError::ConnectionClosed);
        }
        self.callbacks.lock().push((filter.to_string(), callback));
        {
            let mut connections = self.core.connections.lock();
            if let Some(registration) = connections.get_mut(&self.id) {
                registration.filters.push(filter.to_string());
            }
        }
        // replay retained state to the new subscription, flagged retained
        let replay: Vec<Message> = self
            .core
            .retained
            .lock()
            .values()
            .filter(|m| topic_matches(filter, &m.topic))
            .cloned()
            .collect();
        if let Some(sender) = self.sender.lock().as_ref() {
            for mut message in replay {
                message.retain = true;
                let _ = sender.send(message);
            }
        }
        Ok(())
    }

    fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        self.core.remove(self.id, true);
        // dropping the last sender ends the dispatch thread
        self.sender.lock().take();
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        // a dropped handle is a graceful exit; crashes go through
        // InProcessBroker::drop_abruptly
        self.disconnect();
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
