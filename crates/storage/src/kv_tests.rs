// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::BTreeMap;

fn store() -> (tempfile::TempDir, KvStore) {
    let dir = tempfile::tempdir().unwrap();
    let kv = KvStore::open(&dir.path().join("cache.sqlite"), "od_blank").unwrap();
    (dir, kv)
}

#[test]
fn set_get_overwrite() {
    let (_dir, kv) = store();
    assert_eq!(kv.get("exp1").unwrap(), None);
    kv.set("exp1", "0.05").unwrap();
    assert_eq!(kv.get("exp1").unwrap().as_deref(), Some("0.05"));
    kv.set("exp1", "0.06").unwrap();
    assert_eq!(kv.get("exp1").unwrap().as_deref(), Some("0.06"));
}

#[test]
fn pop_removes_and_returns() {
    let (_dir, kv) = store();
    kv.set("exp1", "x").unwrap();
    assert_eq!(kv.pop("exp1").unwrap().as_deref(), Some("x"));
    assert_eq!(kv.pop("exp1").unwrap(), None);
    assert!(!kv.contains("exp1").unwrap());
}

#[test]
fn keys_are_sorted() {
    let (_dir, kv) = store();
    kv.set("b", "2").unwrap();
    kv.set("a", "1").unwrap();
    assert_eq!(kv.keys().unwrap(), vec!["a", "b"]);
    kv.clear().unwrap();
    assert!(kv.keys().unwrap().is_empty());
}

#[test]
fn json_roundtrip() {
    let (_dir, kv) = store();
    let mut means = BTreeMap::new();
    means.insert("1".to_string(), 0.21_f64);
    means.insert("2".to_string(), 0.19_f64);
    kv.set_json("experiment_a", &means).unwrap();
    let back: BTreeMap<String, f64> = kv.get_json("experiment_a").unwrap().unwrap();
    assert_eq!(back, means);
}

#[test]
fn distinct_names_are_isolated_within_one_db() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.sqlite");
    let a = KvStore::open(&path, "growth_rate").unwrap();
    let b = KvStore::open(&path, "od_filtered").unwrap();
    a.set("exp", "0.3").unwrap();
    assert_eq!(b.get("exp").unwrap(), None);
}

#[yare::parameterized(
    uppercase = { "OdBlank" },
    hyphen    = { "od-blank" },
    empty     = { "" },
    injection = { "x; DROP TABLE" },
)]
fn bad_cache_names_are_rejected(name: &str) {
    let dir = tempfile::tempdir().unwrap();
    let err = KvStore::open(&dir.path().join("cache.sqlite"), name).unwrap_err();
    assert!(matches!(err, StorageError::BadCacheName(_)));
}

#[test]
fn intermittent_and_persistent_stores_use_separate_databases() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = DataDir::new(tmp.path());
    let intermittent = local_intermittent_storage(&dir, "pwm").unwrap();
    let persistent = local_persistent_storage(&dir, "pwm").unwrap();
    intermittent.set("1", "held").unwrap();
    assert_eq!(persistent.get("1").unwrap(), None);
    assert!(dir.intermittent_cache_db().exists());
    assert!(dir.persistent_cache_db().exists());
}
