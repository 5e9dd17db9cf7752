// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job logging: tracing locally, JSON records to the broker.
//!
//! Every record goes to the process's tracing subscriber; unless the job
//! is local-only, it is also forwarded to
//! `pioreactor/<unit>/<exp>/logs/app` so the leader can stream cluster
//! logs into its database.

use chrono::Utc;
use pio_core::structs::LogRecord;
use pio_core::topics;
use pio_pubsub::{Client, QoS};
use std::sync::Arc;

#[derive(Clone)]
pub struct JobLogger {
    unit: String,
    task: String,
    source: String,
    topic: String,
    publisher: Option<Arc<Client>>,
}

impl JobLogger {
    /// `publisher = None` keeps records off the broker (`--local-only`).
    pub fn new(
        unit: &str,
        experiment: &str,
        task: &str,
        source: &str,
        publisher: Option<Arc<Client>>,
    ) -> Self {
        Self {
            unit: unit.to_string(),
            task: task.to_string(),
            source: source.to_string(),
            topic: topics::app_logs(unit, experiment),
            publisher,
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(unit = %self.unit, task = %self.task, "{message}");
        self.forward("DEBUG", message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(unit = %self.unit, task = %self.task, "{message}");
        self.forward("INFO", message);
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!(unit = %self.unit, task = %self.task, "{message}");
        self.forward("WARNING", message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!(unit = %self.unit, task = %self.task, "{message}");
        self.forward("ERROR", message);
    }

    pub fn log_level(&self, level: &str, message: &str) {
        match level.to_uppercase().as_str() {
            "DEBUG" => self.debug(message),
            "WARNING" => self.warning(message),
            "ERROR" => self.error(message),
            _ => self.info(message),
        }
    }

    fn forward(&self, level: &str, message: &str) {
        let Some(publisher) = &self.publisher else { return };
        let record = LogRecord {
            message: message.to_string(),
            level: level.to_string(),
            task: self.task.clone(),
            source: self.source.clone(),
            timestamp: Utc::now(),
        };
        // log delivery is best-effort; broker loss must never take a job down
        if let Err(e) = publisher.publish_json(&self.topic, &record, QoS::AtLeastOnce, false) {
            tracing::debug!(error = %e, "could not forward log record to broker");
        }
    }
}

#[cfg(test)]
#[path = "logger_tests.rs"]
mod tests;
