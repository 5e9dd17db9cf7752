// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical MQTT topic layout.
//!
//! All runtime topics live under `pioreactor/<unit>/<experiment>/<job>/…`.
//! Two reserved identifiers exist: `$broadcast` as a unit addresses every
//! active worker, and `$experiment` as an experiment scopes node-wide state.

/// Root segment of every topic.
pub const TOPIC_PREFIX: &str = "pioreactor";

/// Reserved unit addressing all active workers.
pub const BROADCAST: &str = "$broadcast";

/// Reserved experiment meaning "any experiment" / node-wide state.
pub const UNIVERSAL_EXPERIMENT: &str = "$experiment";

/// The state setting's topic leaf.
pub const STATE_SETTING: &str = "$state";

/// Job names reserved by other parts of the system.
pub const DISALLOWED_JOB_NAMES: &[&str] =
    &["run", "dosing_events", "leds", "led_change_events", "unit_label", "pwm"];

/// Retained topic carrying a job's lifecycle state.
pub fn state(unit: &str, experiment: &str, job_name: &str) -> String {
    format!("{TOPIC_PREFIX}/{unit}/{experiment}/{job_name}/{STATE_SETTING}")
}

/// Retained topic for one published setting. `state` maps to `$state`.
pub fn setting(unit: &str, experiment: &str, job_name: &str, setting: &str) -> String {
    let leaf = if setting == "state" { STATE_SETTING } else { setting };
    format!("{TOPIC_PREFIX}/{unit}/{experiment}/{job_name}/{leaf}")
}

/// Mutation topic for one published setting.
pub fn setting_set(unit: &str, experiment: &str, job_name: &str, setting: &str) -> String {
    format!("{}/set", self::setting(unit, experiment, job_name, setting))
}

/// Wildcard filter covering every `/set` mutation for a job.
pub fn set_filter(unit: &str, experiment: &str, job_name: &str) -> String {
    format!("{TOPIC_PREFIX}/{unit}/{experiment}/{job_name}/+/set")
}

/// Non-retained app log stream for a unit/experiment pair.
pub fn app_logs(unit: &str, experiment: &str) -> String {
    format!("{TOPIC_PREFIX}/{unit}/{experiment}/logs/app")
}

/// Topic the monitor job watches for error-code blink requests.
pub fn monitor_flicker(unit: &str, experiment: &str) -> String {
    format!("{TOPIC_PREFIX}/{unit}/{experiment}/monitor/flicker_led_with_error_code")
}

/// Non-retained dosing event stream.
pub fn dosing_events(unit: &str, experiment: &str) -> String {
    format!("{TOPIC_PREFIX}/{unit}/{experiment}/dosing_events")
}

/// Batched OD samples published by the od_reading job.
pub fn od_readings(unit: &str, experiment: &str) -> String {
    format!("{TOPIC_PREFIX}/{unit}/{experiment}/od_reading/ods")
}

/// Extract the setting name from a `…/<setting>/set` topic, stripping any
/// `$` prefix (so `$state/set` yields `state`). Returns None for topics
/// that aren't five-segment `/set` topics.
pub fn setting_from_set_topic(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    if parts.next() != Some(TOPIC_PREFIX) {
        return None;
    }
    let _unit = parts.next()?;
    let _experiment = parts.next()?;
    let _job = parts.next()?;
    let setting = parts.next()?;
    if parts.next() != Some("set") || parts.next().is_some() {
        return None;
    }
    Some(setting.trim_start_matches('$'))
}

/// Unit names are hostnames: ASCII alphanumerics and hyphens.
/// `$broadcast` is accepted as the reserved wildcard.
pub fn is_valid_unit_name(unit: &str) -> bool {
    unit == BROADCAST
        || (!unit.is_empty()
            && unit.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

/// Job names are lowercase alphanumeric chunks separated by underscores,
/// and must not collide with the reserved names.
pub fn is_valid_job_name(job_name: &str) -> bool {
    !DISALLOWED_JOB_NAMES.contains(&job_name)
        && crate::settings::is_valid_setting_name(job_name)
}

#[cfg(test)]
#[path = "topics_tests.rs"]
mod tests;
