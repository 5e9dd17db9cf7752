// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn setting_pairs_parse_and_normalize_hyphens() {
    let raw: Vec<String> =
        ["--target-rpm", "500", "--volume", "1.5"].iter().map(|s| s.to_string()).collect();
    let pairs = parse_setting_pairs(&raw).unwrap();
    assert_eq!(
        pairs,
        vec![
            ("target_rpm".to_string(), "500".to_string()),
            ("volume".to_string(), "1.5".to_string()),
        ]
    );
}

#[yare::parameterized(
    bare_value   = { &["500"] },
    missing_value = { &["--target-rpm"] },
    not_a_flag   = { &["target-rpm", "500"] },
)]
fn bad_setting_pairs_are_rejected(raw: &[&str]) {
    let raw: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
    assert!(parse_setting_pairs(&raw).is_err());
}

#[test]
fn empty_pairs_are_fine() {
    assert_eq!(parse_setting_pairs(&[]).unwrap(), vec![]);
}
