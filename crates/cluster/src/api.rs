// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The leader's HTTP surface (`/api`).
//!
//! Inventory CRUD plus cross-cluster job views: every worker route is
//! mirrored under `/api/workers/<unit>/…` by dispatching, with
//! `$broadcast` expanding to the active workers of the experiment.

use crate::dispatch::ClusterDispatcher;
use crate::inventory::Inventory;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use pio_core::topics;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Clone)]
pub struct LeaderState {
    pub dispatcher: ClusterDispatcher,
    pub inventory: Arc<Inventory>,
}

pub fn leader_router(state: LeaderState) -> Router {
    Router::new()
        .route("/api/workers", get(list_workers).put(add_worker))
        .route("/api/workers/:unit", delete(remove_worker))
        .route("/api/workers/:unit/is_active", put(set_active))
        .route(
            "/api/experiments/:experiment/workers",
            get(experiment_workers).put(assign_worker),
        )
        .route("/api/experiments/:experiment/workers/:unit", delete(unassign_worker))
        .route("/api/workers/:unit/jobs", get(jobs_history))
        .route("/api/workers/:unit/jobs/running", get(jobs_running))
        .route(
            "/api/workers/:unit/jobs/settings/job_name/:job/experiments/:experiment",
            get(job_settings),
        )
        .route(
            "/api/workers/:unit/jobs/run/job_name/:job/experiments/:experiment",
            post(run_job),
        )
        .route(
            "/api/workers/:unit/jobs/update/job_name/:job/experiments/:experiment",
            axum::routing::patch(update_job),
        )
        .route(
            "/api/workers/:unit/jobs/stop/job_name/:job/experiments/:experiment",
            post(stop_job),
        )
        .route("/api/workers/:unit/jobs/stop/experiments/:experiment", post(stop_experiment))
        .route("/api/units/:unit/capabilities", get(unit_capabilities))
        .with_state(state)
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response()
}

/// Expand `$broadcast` into the experiment's active workers (or every
/// active worker when the route is experiment-agnostic).
fn resolve_units(
    inventory: &Inventory,
    unit: &str,
    experiment: Option<&str>,
) -> Result<Vec<String>, crate::error::ClusterError> {
    if unit != topics::BROADCAST {
        return Ok(vec![unit.to_string()]);
    }
    match experiment {
        Some(experiment) if experiment != topics::UNIVERSAL_EXPERIMENT => {
            inventory.active_workers_in_experiment(experiment)
        }
        _ => inventory.active_workers(),
    }
}

// -- inventory ---------------------------------------------------------

async fn list_workers(State(state): State<LeaderState>) -> Response {
    match state.inventory.list_workers() {
        Ok(workers) => Json(workers).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct AddWorkerRequest {
    pioreactor_unit: String,
    model_name: Option<String>,
    model_version: Option<String>,
}

async fn add_worker(
    State(state): State<LeaderState>,
    Json(request): Json<AddWorkerRequest>,
) -> Response {
    if !topics::is_valid_unit_name(&request.pioreactor_unit)
        || request.pioreactor_unit == topics::BROADCAST
    {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad unit name"}))).into_response();
    }
    match state.inventory.add_worker(
        &request.pioreactor_unit,
        request.model_name.as_deref(),
        request.model_version.as_deref(),
    ) {
        Ok(()) => (StatusCode::CREATED, Json(json!({"added": request.pioreactor_unit})))
            .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn remove_worker(State(state): State<LeaderState>, Path(unit): Path<String>) -> Response {
    match state.inventory.remove_worker(&unit) {
        Ok(true) => Json(json!({"removed": unit})).into_response(),
        Ok(false) => {
            (StatusCode::NOT_FOUND, Json(json!({"error": "unknown worker"}))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct SetActiveRequest {
    is_active: Value,
}

async fn set_active(
    State(state): State<LeaderState>,
    Path(unit): Path<String>,
    Json(request): Json<SetActiveRequest>,
) -> Response {
    // accept both 0/1 and booleans, like the CLI sends
    let is_active = match &request.is_active {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        _ => return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad is_active"}))).into_response(),
    };
    match state.inventory.set_active(&unit, is_active) {
        Ok(true) => Json(json!({"pioreactor_unit": unit, "is_active": is_active})).into_response(),
        Ok(false) => {
            (StatusCode::NOT_FOUND, Json(json!({"error": "unknown worker"}))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

async fn experiment_workers(
    State(state): State<LeaderState>,
    Path(experiment): Path<String>,
) -> Response {
    match state.inventory.workers_in_experiment(&experiment) {
        Ok(workers) => Json(workers).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct AssignRequest {
    pioreactor_unit: String,
}

async fn assign_worker(
    State(state): State<LeaderState>,
    Path(experiment): Path<String>,
    Json(request): Json<AssignRequest>,
) -> Response {
    match state.inventory.assign_to_experiment(&request.pioreactor_unit, &experiment) {
        Ok(true) => Json(json!({"assigned": request.pioreactor_unit, "experiment": experiment}))
            .into_response(),
        Ok(false) => {
            (StatusCode::NOT_FOUND, Json(json!({"error": "unknown worker"}))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

async fn unassign_worker(
    State(state): State<LeaderState>,
    Path((experiment, unit)): Path<(String, String)>,
) -> Response {
    match state.inventory.unassign_from_experiment(&unit, &experiment) {
        Ok(true) => Json(json!({"unassigned": unit})).into_response(),
        Ok(false) => {
            (StatusCode::NOT_FOUND, Json(json!({"error": "not assigned"}))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

// -- dispatched job views ----------------------------------------------

/// Single-unit calls return the unit's result directly; broadcast calls
/// return the whole `{unit: result-or-null}` map.
fn fan_in(unit: &str, results: std::collections::BTreeMap<String, Option<Value>>) -> Response {
    if unit == topics::BROADCAST {
        Json(results).into_response()
    } else {
        let value = results.get(unit).cloned().flatten().unwrap_or(Value::Null);
        Json(value).into_response()
    }
}

async fn jobs_running(State(state): State<LeaderState>, Path(unit): Path<String>) -> Response {
    let units = match resolve_units(&state.inventory, &unit, None) {
        Ok(units) => units,
        Err(e) => return internal_error(e),
    };
    let results = state.dispatcher.multicast_get("/unit_api/jobs/running", &units).await;
    fan_in(&unit, results)
}

async fn jobs_history(State(state): State<LeaderState>, Path(unit): Path<String>) -> Response {
    let units = match resolve_units(&state.inventory, &unit, None) {
        Ok(units) => units,
        Err(e) => return internal_error(e),
    };
    let results = state.dispatcher.multicast_get("/unit_api/jobs", &units).await;
    fan_in(&unit, results)
}

async fn job_settings(
    State(state): State<LeaderState>,
    Path((unit, job, experiment)): Path<(String, String, String)>,
) -> Response {
    let units = match resolve_units(&state.inventory, &unit, Some(&experiment)) {
        Ok(units) => units,
        Err(e) => return internal_error(e),
    };
    let endpoint = format!("/unit_api/jobs/settings/job_name/{job}/experiments/{experiment}");
    let results = state.dispatcher.multicast_get(&endpoint, &units).await;
    fan_in(&unit, results)
}

async fn run_job(
    State(state): State<LeaderState>,
    Path((unit, job, experiment)): Path<(String, String, String)>,
    body: Option<Json<Value>>,
) -> Response {
    let units = match resolve_units(&state.inventory, &unit, Some(&experiment)) {
        Ok(units) => units,
        Err(e) => return internal_error(e),
    };
    let mut json = body.map(|Json(body)| body).unwrap_or_else(|| json!({}));
    if let Value::Object(map) = &mut json {
        let env = map.entry("env").or_insert_with(|| json!({}));
        if let Value::Object(env) = env {
            env.entry("EXPERIMENT".to_string()).or_insert_with(|| json!(experiment.clone()));
        }
    }
    let endpoint = format!("/unit_api/jobs/run/job_name/{job}");
    let results = state.dispatcher.multicast_post(&endpoint, &units, Some(json)).await;
    fan_in(&unit, results)
}

async fn update_job(
    State(state): State<LeaderState>,
    Path((unit, job, experiment)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let units = match resolve_units(&state.inventory, &unit, Some(&experiment)) {
        Ok(units) => units,
        Err(e) => return internal_error(e),
    };
    let endpoint = format!("/unit_api/jobs/update/job_name/{job}/experiments/{experiment}");
    let results = state.dispatcher.multicast_patch(&endpoint, &units, Some(body)).await;
    fan_in(&unit, results)
}

async fn stop_job(
    State(state): State<LeaderState>,
    Path((unit, job, experiment)): Path<(String, String, String)>,
) -> Response {
    let units = match resolve_units(&state.inventory, &unit, Some(&experiment)) {
        Ok(units) => units,
        Err(e) => return internal_error(e),
    };
    let endpoint = format!("/unit_api/jobs/stop/job_name/{job}/experiments/{experiment}");
    let results = state.dispatcher.multicast_post(&endpoint, &units, None).await;
    fan_in(&unit, results)
}

async fn stop_experiment(
    State(state): State<LeaderState>,
    Path((unit, experiment)): Path<(String, String)>,
) -> Response {
    let units = match resolve_units(&state.inventory, &unit, Some(&experiment)) {
        Ok(units) => units,
        Err(e) => return internal_error(e),
    };
    let endpoint = format!("/unit_api/jobs/stop/experiments/{experiment}");
    let results = state.dispatcher.multicast_post(&endpoint, &units, None).await;
    fan_in(&unit, results)
}

async fn unit_capabilities(State(state): State<LeaderState>, Path(unit): Path<String>) -> Response {
    let units = vec![unit.clone()];
    let results = state.dispatcher.multicast_get("/unit_api/capabilities", &units).await;
    fan_in(&unit, results)
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
