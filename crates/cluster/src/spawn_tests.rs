// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::os::unix::fs::PermissionsExt;

fn script(dir: &std::path::Path, body: &str) -> PathBuf {
    let path = dir.join("fake_pio");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn long_lived_process_counts_as_started() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(dir.path(), "sleep 5");
    let started =
        spawn_job_process(&exe, "stirring", &RunRequest::default(), Duration::from_millis(200))
            .await;
    assert!(started);
}

#[tokio::test]
async fn fast_exit_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(dir.path(), "exit 1");
    let started =
        spawn_job_process(&exe, "stirring", &RunRequest::default(), Duration::from_millis(300))
            .await;
    assert!(!started);
}

#[tokio::test]
async fn missing_executable_is_a_failure() {
    let exe = PathBuf::from("/nonexistent/pio");
    let started =
        spawn_job_process(&exe, "stirring", &RunRequest::default(), Duration::from_millis(100))
            .await;
    assert!(!started);
}

#[tokio::test]
async fn options_and_args_are_passed_through() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("argv.txt");
    let exe = script(dir.path(), &format!("echo \"$@\" > {}\nsleep 2", marker.display()));

    let mut request = RunRequest::default();
    request.options.insert("target_rpm".to_string(), serde_json::json!(500));
    request.options.insert("skip_stirring".to_string(), serde_json::json!(true));
    request.args.push("positional".to_string());

    let started =
        spawn_job_process(&exe, "stirring", &request, Duration::from_millis(300)).await;
    assert!(started);

    let argv = std::fs::read_to_string(&marker).unwrap();
    assert!(argv.contains("run stirring"), "argv: {argv}");
    assert!(argv.contains("--target-rpm 500"), "argv: {argv}");
    // boolean true options become bare flags
    assert!(argv.contains("--skip-stirring"), "argv: {argv}");
    assert!(!argv.contains("--skip-stirring true"), "argv: {argv}");
    assert!(argv.contains("positional"), "argv: {argv}");
}

#[test]
fn env_filtering_drops_unknown_keys() {
    let mut overrides = HashMap::new();
    overrides.insert("JOB_SOURCE".to_string(), "experiment_profile".to_string());
    overrides.insert("LD_PRELOAD".to_string(), "/evil.so".to_string());
    let env = filtered_env(&overrides);
    assert_eq!(env.get("JOB_SOURCE").map(String::as_str), Some("experiment_profile"));
    assert!(!env.contains_key("LD_PRELOAD"));
}

#[test]
fn option_flags_use_hyphens() {
    assert_eq!(option_flag("target_rpm"), "--target-rpm");
    assert_eq!(option_flag("volume"), "--volume");
}
