// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    float_ok     = { b"500" as &[u8], SettingType::Float, SettingValue::Float(500.0) },
    float_frac   = { b"1.25", SettingType::Float, SettingValue::Float(1.25) },
    int_ok       = { b"42", SettingType::Integer, SettingValue::Integer(42) },
    string_ok    = { b"hello", SettingType::String, SettingValue::String("hello".to_string()) },
    bool_true    = { b"true", SettingType::Boolean, SettingValue::Boolean(true) },
    bool_one     = { b"1", SettingType::Boolean, SettingValue::Boolean(true) },
    bool_on      = { b"ON", SettingType::Boolean, SettingValue::Boolean(true) },
    bool_false   = { b"false", SettingType::Boolean, SettingValue::Boolean(false) },
    bool_other   = { b"nope", SettingType::Boolean, SettingValue::Boolean(false) },
)]
fn decode_scalar_payloads(payload: &[u8], datatype: SettingType, expected: SettingValue) {
    assert_eq!(decode_setting_payload(payload, datatype).unwrap(), expected);
}

#[test]
fn decode_json_payload() {
    let decoded = decode_setting_payload(br#"{"a": 1}"#, SettingType::Json).unwrap();
    assert_eq!(decoded, SettingValue::Json(serde_json::json!({"a": 1})));
}

#[yare::parameterized(
    float_garbage = { b"abc" as &[u8], SettingType::Float },
    int_frac      = { b"1.5", SettingType::Integer },
    json_garbage  = { b"{", SettingType::Json },
)]
fn decode_rejects_bad_payloads(payload: &[u8], datatype: SettingType) {
    assert!(decode_setting_payload(payload, datatype).is_err());
}

#[yare::parameterized(
    simple       = { "target_rpm", true },
    single       = { "volume", true },
    digits       = { "od600_reading", true },
    uppercase    = { "TargetRpm", false },
    hyphen       = { "target-rpm", false },
    empty        = { "", false },
    double_score = { "target__rpm", false },
    trailing     = { "rpm_", false },
)]
fn setting_name_validation(name: &str, ok: bool) {
    assert_eq!(is_valid_setting_name(name), ok);
}

#[test]
fn schema_validation_flags_first_bad_name() {
    let good = PublishedSetting::new(SettingType::Float, true);
    let entries = vec![("target_rpm", &good), ("Bad-Name", &good)];
    let err = validate_published_settings(entries).unwrap_err();
    assert_eq!(err, SettingsError::BadName("Bad-Name".to_string()));
}

#[test]
fn payload_encoding_is_plain_text_for_scalars() {
    assert_eq!(SettingValue::Float(500.0).to_payload(), b"500");
    assert_eq!(SettingValue::Integer(-2).to_payload(), b"-2");
    assert_eq!(SettingValue::Boolean(true).to_payload(), b"true");
    assert_eq!(SettingValue::String("ready".to_string()).to_payload(), b"ready");
}

#[yare::parameterized(
    no_unit = { "25.0", None, "25.0" },
    cm      = { "25.0", Some("cm"), "25.0 cm" },
    percent = { "25.0", Some("%"), "25.0%" },
)]
fn unit_formatting(value: &str, unit: Option<&str>, expected: &str) {
    assert_eq!(format_with_optional_units(value, unit), expected);
}

#[test]
fn unit_formatting_truncates_long_values() {
    let long = "a".repeat(60);
    let formatted = format_with_optional_units(&long, None);
    assert!(formatted.ends_with("..."));
    assert_eq!(formatted.chars().count(), 43);
}

#[test]
fn setting_value_accessors() {
    assert_eq!(SettingValue::Float(2.5).as_f64(), Some(2.5));
    assert_eq!(SettingValue::Integer(3).as_f64(), Some(3.0));
    assert_eq!(SettingValue::Boolean(true).as_bool(), Some(true));
    assert_eq!(SettingValue::String("x".to_string()).as_str(), Some("x"));
    assert_eq!(SettingValue::String("x".to_string()).as_f64(), None);
}
