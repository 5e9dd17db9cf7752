// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detached job-process spawning with a fast-fail grace window.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

/// How long a spawned process must stay alive to count as started.
pub const GRACE_WINDOW: Duration = Duration::from_millis(500);

/// Environment variables a caller may pass through to a spawned job.
const ALLOWED_ENV: &[&str] = &[
    "ACTIVE",
    "EXPERIMENT",
    "HOME",
    "JOB_SOURCE",
    "PATH",
    "PIO_DATA_DIR",
    "PIO_TESTING",
    "PIO_UNIT",
];

/// Body of `POST /unit_api/jobs/run/job_name/<job>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub config_overrides: Vec<String>,
}

fn option_flag(name: &str) -> String {
    format!("--{}", name.replace('_', "-"))
}

fn filtered_env(overrides: &HashMap<String, String>) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars()
        .filter(|(key, _)| ALLOWED_ENV.contains(&key.as_str()))
        .collect();
    for (key, value) in overrides {
        if ALLOWED_ENV.contains(&key.as_str()) && !value.is_empty() {
            env.insert(key.clone(), value.clone());
        }
    }
    env
}

/// Spawn `pio run <job> …` detached. Returns true if the process is
/// still alive after the grace window; a sooner exit probably means bad
/// arguments or a refused duplicate.
pub async fn spawn_job_process(
    executable: &PathBuf,
    job_name: &str,
    request: &RunRequest,
    grace: Duration,
) -> bool {
    let mut command = tokio::process::Command::new(executable);
    command.arg("run");
    for flag in &request.config_overrides {
        command.arg(flag);
    }
    command.arg(job_name);
    for (name, value) in &request.options {
        match value {
            serde_json::Value::Bool(true) => {
                command.arg(option_flag(name));
            }
            serde_json::Value::Bool(false) => {}
            serde_json::Value::String(s) => {
                command.arg(option_flag(name));
                command.arg(s);
            }
            other => {
                command.arg(option_flag(name));
                command.arg(other.to_string());
            }
        }
    }
    for arg in &request.args {
        command.arg(arg);
    }
    command
        .env_clear()
        .envs(filtered_env(&request.env))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    tracing::debug!(job_name, ?executable, "spawning job process");
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::error!(job_name, error = %e, "failed to spawn job process");
            return false;
        }
    };

    // still running after the grace window: treat as started
    match tokio::time::timeout(grace, child.wait()).await {
        Err(_elapsed) => true,
        Ok(_exit) => false,
    }
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
