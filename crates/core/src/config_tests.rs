// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sample() -> Config {
    Config::parse(
        r#"
[stirring]
target_rpm = 500
enable_dodging_od = true
pre_delay_duration = 1.5

[od_reading]
samples_per_second = 0.2

[cluster]
leader_hostname = "leader1"
api_port = 4999

[cluster.addresses]
worker1 = "10.0.0.12"
"#,
    )
    .unwrap()
}

#[test]
fn typed_getters() {
    let config = sample();
    assert_eq!(config.getint("stirring", "target_rpm"), Some(500));
    assert_eq!(config.getfloat("stirring", "target_rpm"), Some(500.0));
    assert_eq!(config.getfloat("stirring", "pre_delay_duration"), Some(1.5));
    assert_eq!(config.getbool("stirring", "enable_dodging_od"), Some(true));
    assert_eq!(config.get("cluster", "leader_hostname").as_deref(), Some("leader1"));
    assert_eq!(config.getfloat("od_reading", "samples_per_second"), Some(0.2));
}

#[test]
fn missing_keys_fall_back() {
    let config = sample();
    assert_eq!(config.getfloat("stirring", "missing"), None);
    assert_eq!(config.getfloat_or("stirring", "missing", 0.5), 0.5);
    assert_eq!(config.getint_or("nope", "missing", 3), 3);
    assert!(config.getbool_or("nope", "missing", true));
}

#[test]
fn dotted_sections_address_nested_tables() {
    let config = sample();
    assert!(config.has_section("cluster.addresses"));
    assert_eq!(config.get("cluster.addresses", "worker1").as_deref(), Some("10.0.0.12"));
    assert!(!config.has_section("cluster.missing"));
}

#[test]
fn section_items_lists_scalars_only() {
    let config = sample();
    let mut items = config.section_items("cluster");
    items.sort();
    assert_eq!(
        items,
        vec![
            ("api_port".to_string(), "4999".to_string()),
            ("leader_hostname".to_string(), "leader1".to_string()),
        ]
    );
}

#[test]
fn unit_layer_overrides_global_scalars() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(GLOBAL_CONFIG),
        "[stirring]\ntarget_rpm = 500\npre_delay_duration = 1.5\n",
    )
    .unwrap();
    std::fs::write(dir.path().join(UNIT_CONFIG), "[stirring]\ntarget_rpm = 300\n").unwrap();

    let config = Config::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.getint("stirring", "target_rpm"), Some(300));
    // untouched keys survive the merge
    assert_eq!(config.getfloat("stirring", "pre_delay_duration"), Some(1.5));
}

#[test]
fn env_style_overrides_apply_last() {
    let mut config = sample();
    config.apply_env_overrides(
        vec![
            ("PIO_CONFIG_STIRRING__TARGET_RPM".to_string(), "250".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ]
        .into_iter(),
    );
    // env values arrive as strings; typed getters parse them
    assert_eq!(config.getint("stirring", "target_rpm"), Some(250));
}

#[test]
fn set_creates_intermediate_tables() {
    let mut config = Config::empty();
    config.set("cluster.addresses", "worker2", toml::Value::String("10.0.0.13".into()));
    assert_eq!(config.get("cluster.addresses", "worker2").as_deref(), Some("10.0.0.13"));
}

#[test]
fn bool_spellings_from_strings() {
    let mut config = Config::empty();
    config.set("s", "a", toml::Value::String("yes".into()));
    config.set("s", "b", toml::Value::String("off".into()));
    assert_eq!(config.getbool("s", "a"), Some(true));
    assert_eq!(config.getbool("s", "b"), Some(false));
}
