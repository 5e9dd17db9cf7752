// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pio_core::Config;
use serde_json::json;

struct Fixture {
    base_url: String,
    http: reqwest::Client,
    inventory: Arc<Inventory>,
    _tmp: tempfile::TempDir,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_config(Config::empty()).await
    }

    async fn with_config(config: Config) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let inventory = Arc::new(Inventory::open(&tmp.path().join("cluster.sqlite")).unwrap());
        let state = LeaderState {
            dispatcher: ClusterDispatcher::new(config),
            inventory: Arc::clone(&inventory),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, leader_router(state)).await.unwrap();
        });
        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            http: reqwest::Client::new(),
            inventory,
            _tmp: tmp,
        }
    }
}

#[tokio::test]
async fn worker_inventory_crud_over_http() {
    let fixture = Fixture::new().await;

    let created = fixture
        .http
        .put(format!("{}/api/workers", fixture.base_url))
        .json(&json!({"pioreactor_unit": "worker1", "model_name": "pioreactor_20ml", "model_version": "1.1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), reqwest::StatusCode::CREATED);

    let listed: serde_json::Value = fixture
        .http
        .get(format!("{}/api/workers", fixture.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed[0]["pioreactor_unit"], "worker1");
    assert_eq!(listed[0]["is_active"], true);

    let deactivated = fixture
        .http
        .put(format!("{}/api/workers/worker1/is_active", fixture.base_url))
        .json(&json!({"is_active": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(deactivated.status(), reqwest::StatusCode::OK);
    assert!(fixture.inventory.active_workers().unwrap().is_empty());

    let removed = fixture
        .http
        .delete(format!("{}/api/workers/worker1", fixture.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status(), reqwest::StatusCode::OK);
    let missing = fixture
        .http
        .delete(format!("{}/api/workers/worker1", fixture.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn broadcast_unit_names_are_rejected_on_add() {
    let fixture = Fixture::new().await;
    let response = fixture
        .http
        .put(format!("{}/api/workers", fixture.base_url))
        .json(&json!({"pioreactor_unit": "$broadcast"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn experiment_assignment_over_http() {
    let fixture = Fixture::new().await;
    fixture.inventory.add_worker("worker1", None, None).unwrap();
    fixture.inventory.add_worker("worker2", None, None).unwrap();

    let assigned = fixture
        .http
        .put(format!("{}/api/experiments/exp_a/workers", fixture.base_url))
        .json(&json!({"pioreactor_unit": "worker1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(assigned.status(), reqwest::StatusCode::OK);

    let listed: serde_json::Value = fixture
        .http
        .get(format!("{}/api/experiments/exp_a/workers", fixture.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["pioreactor_unit"], "worker1");

    let unassigned = fixture
        .http
        .delete(format!("{}/api/experiments/exp_a/workers/worker1", fixture.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(unassigned.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn broadcast_resolution_uses_active_workers_in_experiment() {
    let fixture = Fixture::new().await;
    fixture.inventory.add_worker("worker1", None, None).unwrap();
    fixture.inventory.add_worker("worker2", None, None).unwrap();
    fixture.inventory.add_worker("worker3", None, None).unwrap();
    fixture.inventory.assign_to_experiment("worker1", "exp_a").unwrap();
    fixture.inventory.assign_to_experiment("worker2", "exp_a").unwrap();
    fixture.inventory.assign_to_experiment("worker3", "exp_b").unwrap();
    fixture.inventory.set_active("worker2", false).unwrap();

    let units =
        resolve_units(&fixture.inventory, topics::BROADCAST, Some("exp_a")).unwrap();
    assert_eq!(units, vec!["worker1"]);

    let all = resolve_units(&fixture.inventory, topics::BROADCAST, None).unwrap();
    assert_eq!(all, vec!["worker1", "worker3"]);

    let single = resolve_units(&fixture.inventory, "worker9", Some("exp_a")).unwrap();
    assert_eq!(single, vec!["worker9"]);
}

#[tokio::test]
async fn leader_mirrors_worker_job_listings() {
    // a fake worker answering /unit_api/jobs/running
    let worker = axum::Router::new().route(
        "/unit_api/jobs/running",
        axum::routing::get(|| async {
            axum::Json(json!([{"job_name": "stirring", "job_id": 7}]))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let worker_port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, worker).await.unwrap();
    });

    let mut config = Config::empty();
    config.set(
        "cluster.addresses",
        "worker1",
        toml::Value::String(format!("127.0.0.1:{worker_port}")),
    );
    let fixture = Fixture::with_config(config).await;
    fixture.inventory.add_worker("worker1", None, None).unwrap();

    let jobs: serde_json::Value = fixture
        .http
        .get(format!("{}/api/workers/worker1/jobs/running", fixture.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jobs[0]["job_name"], "stirring");
}
