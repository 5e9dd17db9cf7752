// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker's HTTP surface (`/unit_api`).
//!
//! Spawns are asynchronous: the handler answers
//! `202 {task_id, result_url_path}` immediately and the dispatcher polls
//! the task result, which resolves to whether the spawned process
//! survived its grace window.

use crate::capabilities;
use crate::spawn::{self, RunRequest};
use crate::tasks::{TaskStatus, TaskStore};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use pio_core::{topics, Config};
use pio_pubsub::{Client, QoS};
use pio_storage::{DataDir, JobManager, KillFilter};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct UnitApiState {
    pub unit: String,
    pub data_dir: DataDir,
    pub config: Config,
    pub tasks: TaskStore,
    /// Publisher used to forward `/jobs/update` settings to the broker.
    pub publisher: Arc<Client>,
    pub pio_executable: PathBuf,
}

pub fn unit_api_router(state: UnitApiState) -> Router {
    Router::new()
        .route("/unit_api/jobs/run/job_name/:job", post(run_job))
        .route("/unit_api/jobs/stop", post(stop_with_body).patch(stop_with_body))
        .route("/unit_api/jobs/stop/job_name/:job", post(stop_job).patch(stop_job))
        .route(
            "/unit_api/jobs/stop/job_name/:job/experiments/:experiment",
            post(stop_job_in_experiment).patch(stop_job_in_experiment),
        )
        .route(
            "/unit_api/jobs/stop/experiments/:experiment",
            post(stop_experiment).patch(stop_experiment),
        )
        .route("/unit_api/jobs/update/job_name/:job/experiments/:experiment", patch(update_job))
        .route("/unit_api/jobs", get(list_jobs))
        .route("/unit_api/jobs/running", get(list_running))
        .route(
            "/unit_api/jobs/settings/job_name/:job/experiments/:experiment",
            get(job_settings),
        )
        .route("/unit_api/task_results/:task_id", get(task_result))
        .route("/unit_api/capabilities", get(unit_capabilities))
        .with_state(state)
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response()
}

async fn run_job(
    State(state): State<UnitApiState>,
    Path(job): Path<String>,
    body: Option<Json<RunRequest>>,
) -> impl IntoResponse {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let task_id = state.tasks.create();
    let result_url_path = state.tasks.result_url_path(&task_id);

    let tasks = state.tasks.clone();
    let executable = state.pio_executable.clone();
    let pending_task = task_id.clone();
    tokio::spawn(async move {
        let started =
            spawn::spawn_job_process(&executable, &job, &request, spawn::GRACE_WINDOW).await;
        tasks.complete(&pending_task, json!(started));
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({"task_id": task_id, "result_url_path": result_url_path})),
    )
}

#[derive(Debug, Default, Deserialize)]
struct StopRequest {
    #[serde(default)]
    all_jobs: bool,
    job_name: Option<String>,
    experiment: Option<String>,
    job_source: Option<String>,
    job_id: Option<i64>,
}

impl From<StopRequest> for KillFilter {
    fn from(request: StopRequest) -> Self {
        KillFilter {
            all_jobs: request.all_jobs,
            job_name: request.job_name,
            experiment: request.experiment,
            job_source: request.job_source,
            job_id: request.job_id,
        }
    }
}

async fn kill(state: UnitApiState, filter: KillFilter) -> Response {
    let data_dir = state.data_dir.clone();
    let joined = tokio::task::spawn_blocking(move || {
        JobManager::open_in_dir(&data_dir).and_then(|jm| jm.kill_jobs(&filter))
    })
    .await;
    match joined {
        Ok(Ok(count)) => (StatusCode::OK, Json(json!({"stopped": count}))).into_response(),
        Ok(Err(e)) => internal_error(e),
        Err(e) => internal_error(e),
    }
}

async fn stop_with_body(
    State(state): State<UnitApiState>,
    body: Option<Json<StopRequest>>,
) -> Response {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    // a bare stop with no filter means "everything killable"
    let mut filter: KillFilter = request.into();
    if filter.is_empty() {
        filter.all_jobs = true;
    }
    kill(state, filter).await
}

async fn stop_job(State(state): State<UnitApiState>, Path(job): Path<String>) -> Response {
    kill(state, KillFilter::job_name(job)).await
}

async fn stop_job_in_experiment(
    State(state): State<UnitApiState>,
    Path((job, experiment)): Path<(String, String)>,
) -> Response {
    let filter = KillFilter { job_name: Some(job), experiment: Some(experiment), ..KillFilter::default() };
    kill(state, filter).await
}

async fn stop_experiment(
    State(state): State<UnitApiState>,
    Path(experiment): Path<String>,
) -> Response {
    kill(state, KillFilter::experiment(experiment)).await
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    settings: serde_json::Map<String, Value>,
}

/// Publish one `…/<setting>/set` message per pair on behalf of the
/// caller. The running job applies them through its ingest path.
async fn update_job(
    State(state): State<UnitApiState>,
    Path((job, experiment)): Path<(String, String)>,
    Json(request): Json<UpdateRequest>,
) -> Response {
    let mut published = 0;
    for (setting, value) in &request.settings {
        let topic = topics::setting_set(&state.unit, &experiment, &job, setting);
        let payload = match value {
            Value::String(s) => s.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        };
        match state.publisher.publish(&topic, payload, QoS::ExactlyOnce, false) {
            Ok(()) => published += 1,
            Err(e) => return internal_error(e),
        }
    }
    (StatusCode::OK, Json(json!({"settings_published": published}))).into_response()
}

async fn list_jobs(State(state): State<UnitApiState>) -> Response {
    let data_dir = state.data_dir.clone();
    let joined = tokio::task::spawn_blocking(move || {
        JobManager::open_in_dir(&data_dir).and_then(|jm| jm.list_job_history())
    })
    .await;
    match joined {
        Ok(Ok(jobs)) => Json(jobs).into_response(),
        Ok(Err(e)) => internal_error(e),
        Err(e) => internal_error(e),
    }
}

async fn list_running(State(state): State<UnitApiState>) -> Response {
    let data_dir = state.data_dir.clone();
    let joined = tokio::task::spawn_blocking(move || {
        JobManager::open_in_dir(&data_dir).and_then(|jm| jm.list_jobs())
    })
    .await;
    match joined {
        Ok(Ok(jobs)) => Json(jobs).into_response(),
        Ok(Err(e)) => internal_error(e),
        Err(e) => internal_error(e),
    }
}

async fn job_settings(
    State(state): State<UnitApiState>,
    Path((job, experiment)): Path<(String, String)>,
) -> Response {
    let data_dir = state.data_dir.clone();
    let joined = tokio::task::spawn_blocking(move || -> Result<Option<Value>, pio_storage::StorageError> {
        let jm = JobManager::open_in_dir(&data_dir)?;
        let Some(job_id) = jm.get_running_job_id(&job)? else {
            return Ok(None);
        };
        let record = jm.get_job_info(job_id)?;
        if let Some(record) = &record {
            if record.experiment != experiment && experiment != topics::UNIVERSAL_EXPERIMENT {
                return Ok(None);
            }
        }
        let settings: serde_json::Map<String, Value> = jm
            .list_job_settings(job_id)?
            .into_iter()
            .map(|s| (s.setting, s.value.map(Value::String).unwrap_or(Value::Null)))
            .collect();
        Ok(Some(json!({"job_name": job, "job_id": job_id, "settings": settings})))
    })
    .await;
    match joined {
        Ok(Ok(Some(body))) => Json(body).into_response(),
        Ok(Ok(None)) => {
            (StatusCode::NOT_FOUND, Json(json!({"error": "no running job found"}))).into_response()
        }
        Ok(Err(e)) => internal_error(e),
        Err(e) => internal_error(e),
    }
}

async fn task_result(
    State(state): State<UnitApiState>,
    Path(task_id): Path<String>,
) -> Response {
    match state.tasks.status(&task_id) {
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "unknown task"}))).into_response(),
        Some(TaskStatus::Pending) => {
            (StatusCode::ACCEPTED, Json(json!({"task_id": task_id}))).into_response()
        }
        Some(TaskStatus::Done(result)) => {
            (StatusCode::OK, Json(json!({"task_id": task_id, "result": result}))).into_response()
        }
    }
}

async fn unit_capabilities() -> Response {
    Json(capabilities::catalog()).into_response()
}

#[cfg(test)]
#[path = "unit_api_tests.rs"]
mod tests;
