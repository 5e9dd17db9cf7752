// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The leader's fan-out / fan-in over workers.
//!
//! One parallel HTTP call per unit; per-unit failures collapse to `null`
//! in the result map and are logged at debug, never raised. A worker may
//! defer with `202 {task_id, result_url_path}`; the dispatcher polls the
//! result URL and flattens the `{task_id, result}` wrapper away.

use crate::resolve::unit_base_url;
use pio_core::Config;
use reqwest::Method;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Default deadline for mutation fan-outs.
const MUTATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for GET fan-outs.
const GET_TIMEOUT: Duration = Duration::from_secs(15);

/// Attempts per unit before reporting failure (covers slow mDNS).
const CONNECT_ATTEMPTS: u32 = 3;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct ClusterDispatcher {
    http: reqwest::Client,
    config: Config,
}

impl ClusterDispatcher {
    pub fn new(config: Config) -> Self {
        Self { http: reqwest::Client::new(), config }
    }

    pub async fn multicast_get(
        &self,
        endpoint: &str,
        units: &[String],
    ) -> BTreeMap<String, Option<Value>> {
        self.multicast(Method::GET, endpoint, units, None, GET_TIMEOUT).await
    }

    pub async fn multicast_post(
        &self,
        endpoint: &str,
        units: &[String],
        json: Option<Value>,
    ) -> BTreeMap<String, Option<Value>> {
        self.multicast(Method::POST, endpoint, units, json, MUTATE_TIMEOUT).await
    }

    pub async fn multicast_patch(
        &self,
        endpoint: &str,
        units: &[String],
        json: Option<Value>,
    ) -> BTreeMap<String, Option<Value>> {
        self.multicast(Method::PATCH, endpoint, units, json, MUTATE_TIMEOUT).await
    }

    pub async fn multicast_delete(
        &self,
        endpoint: &str,
        units: &[String],
        json: Option<Value>,
    ) -> BTreeMap<String, Option<Value>> {
        self.multicast(Method::DELETE, endpoint, units, json, MUTATE_TIMEOUT).await
    }

    /// Fan out one request to every (deduplicated) unit in parallel.
    /// The map always has one sorted entry per distinct unit.
    async fn multicast(
        &self,
        method: Method,
        endpoint: &str,
        units: &[String],
        json: Option<Value>,
        timeout: Duration,
    ) -> BTreeMap<String, Option<Value>> {
        debug_assert!(endpoint.starts_with("/unit_api"), "dispatch endpoint {endpoint:?}");
        let distinct: BTreeSet<String> = units.iter().cloned().collect();

        let mut join_set = tokio::task::JoinSet::new();
        for unit in distinct.iter().cloned() {
            let dispatcher = self.clone();
            let method = method.clone();
            let endpoint = endpoint.to_string();
            let json = json.clone();
            join_set.spawn(async move {
                let result = dispatcher.request_unit(method, &unit, &endpoint, json, timeout).await;
                (unit, result)
            });
        }

        let mut results: BTreeMap<String, Option<Value>> =
            distinct.into_iter().map(|unit| (unit, None)).collect();
        while let Some(joined) = join_set.join_next().await {
            if let Ok((unit, result)) = joined {
                results.insert(unit, result);
            }
        }
        results
    }

    /// One isolated unit call. Any failure (connect, status, decode)
    /// yields None; the reason goes to the debug log.
    pub async fn request_unit(
        &self,
        method: Method,
        unit: &str,
        endpoint: &str,
        json: Option<Value>,
        timeout: Duration,
    ) -> Option<Value> {
        let url = format!("{}{}", unit_base_url(&self.config, unit), endpoint);

        let mut last_error = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            let mut request = self.http.request(method.clone(), &url).timeout(timeout);
            if let Some(body) = &json {
                request = request.json(body);
            }
            match request.send().await {
                Ok(response) => return self.digest_response(unit, response).await,
                Err(e) if e.is_connect() && attempt < CONNECT_ATTEMPTS => {
                    // name resolution and connection setup get a short
                    // linear backoff; workers may be mid-boot
                    tokio::time::sleep(Duration::from_millis(250 * attempt as u64)).await;
                    last_error = Some(e);
                }
                Err(e) => {
                    tracing::debug!(unit, %url, error = %e, "could not reach unit");
                    return None;
                }
            }
        }
        if let Some(e) = last_error {
            tracing::debug!(unit, %url, error = %e, "could not reach unit after retries");
        }
        None
    }

    /// Normalize delayed (202 + result URL) and immediate (200)
    /// responses down to the bare result value.
    async fn digest_response(&self, unit: &str, response: reqwest::Response) -> Option<Value> {
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(unit, %status, "unit returned an error status");
            return None;
        }
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(unit, error = %e, "could not decode response from unit");
                return None;
            }
        };

        if status == reqwest::StatusCode::ACCEPTED {
            if let Some(result_url_path) = body.get("result_url_path").and_then(Value::as_str) {
                return self.poll_for_result(unit, result_url_path).await;
            }
        }
        Some(flatten_task_wrapper(body))
    }

    /// Poll a delayed result URL until it answers 200.
    async fn poll_for_result(&self, unit: &str, result_url_path: &str) -> Option<Value> {
        let url = format!("{}{}", unit_base_url(&self.config, unit), result_url_path);
        let deadline = tokio::time::Instant::now() + MUTATE_TIMEOUT;
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            if tokio::time::Instant::now() >= deadline {
                tracing::debug!(unit, %url, "gave up waiting for delayed result");
                return None;
            }
            let response = match self.http.get(&url).timeout(GET_TIMEOUT).send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(unit, %url, error = %e, "poll failed");
                    return None;
                }
            };
            match response.status() {
                reqwest::StatusCode::ACCEPTED => continue,
                status if status.is_success() => {
                    let body: Value = response.json().await.ok()?;
                    return Some(flatten_task_wrapper(body));
                }
                status => {
                    tracing::debug!(unit, %url, %status, "delayed result errored");
                    return None;
                }
            }
        }
    }
}

/// `{task_id, result}` wrappers flatten to just the result.
fn flatten_task_wrapper(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("task_id") && map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
