// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn inventory() -> (tempfile::TempDir, Inventory) {
    let dir = tempfile::tempdir().unwrap();
    let inv = Inventory::open(&dir.path().join("cluster.sqlite")).unwrap();
    (dir, inv)
}

#[test]
fn add_list_remove() {
    let (_dir, inv) = inventory();
    inv.add_worker("worker2", Some("pioreactor_20ml"), Some("1.1")).unwrap();
    inv.add_worker("worker1", None, None).unwrap();

    let workers = inv.list_workers().unwrap();
    assert_eq!(workers.len(), 2);
    // sorted by unit name
    assert_eq!(workers[0].pioreactor_unit, "worker1");
    assert_eq!(workers[1].model_name.as_deref(), Some("pioreactor_20ml"));
    assert!(workers.iter().all(|w| w.is_active));

    assert!(inv.remove_worker("worker1").unwrap());
    assert!(!inv.remove_worker("worker1").unwrap());
    assert_eq!(inv.list_workers().unwrap().len(), 1);
}

#[test]
fn re_adding_reactivates() {
    let (_dir, inv) = inventory();
    inv.add_worker("worker1", None, None).unwrap();
    inv.set_active("worker1", false).unwrap();
    assert!(inv.active_workers().unwrap().is_empty());

    inv.add_worker("worker1", Some("pioreactor_40ml"), Some("1.0")).unwrap();
    assert_eq!(inv.active_workers().unwrap(), vec!["worker1"]);
    let worker = inv.get_worker("worker1").unwrap().unwrap();
    assert_eq!(worker.model_name.as_deref(), Some("pioreactor_40ml"));
}

#[test]
fn active_filtering() {
    let (_dir, inv) = inventory();
    inv.add_worker("worker1", None, None).unwrap();
    inv.add_worker("worker2", None, None).unwrap();
    inv.add_worker("worker3", None, None).unwrap();
    inv.set_active("worker2", false).unwrap();

    assert_eq!(inv.active_workers().unwrap(), vec!["worker1", "worker3"]);
    assert!(!inv.set_active("ghost", false).unwrap());
}

#[test]
fn experiment_assignment() {
    let (_dir, inv) = inventory();
    inv.add_worker("worker1", None, None).unwrap();
    inv.add_worker("worker2", None, None).unwrap();
    inv.add_worker("worker3", None, None).unwrap();
    inv.assign_to_experiment("worker1", "exp_a").unwrap();
    inv.assign_to_experiment("worker2", "exp_a").unwrap();
    inv.assign_to_experiment("worker3", "exp_b").unwrap();
    inv.set_active("worker2", false).unwrap();

    assert_eq!(inv.active_workers_in_experiment("exp_a").unwrap(), vec!["worker1"]);
    assert_eq!(inv.workers_in_experiment("exp_a").unwrap().len(), 2);

    assert!(inv.unassign_from_experiment("worker1", "exp_a").unwrap());
    assert!(!inv.unassign_from_experiment("worker1", "exp_a").unwrap());
    assert!(inv.active_workers_in_experiment("exp_a").unwrap().is_empty());
}
