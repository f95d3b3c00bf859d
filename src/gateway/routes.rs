use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::dispatcher::DispatchError;
use crate::event_bus::EventBus;
use crate::model::{Isolation, Job, JobId, JobPatch, Payload, Schedule, SessionTarget, WakeMode};
use crate::scheduler::{Scheduler, SchedulerError};
use crate::store::{JobStore, JobStoreError};

#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<dyn JobStore>,
    pub scheduler: Arc<Scheduler>,
    pub bus: Arc<dyn EventBus>,
    pub auth_token: String,
}

// ─── Error mapping (§7 error taxonomy) ────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl GatewayError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            GatewayError::Store(JobStoreError::InvalidSchedule(_)) => (StatusCode::BAD_REQUEST, "invalid_schedule"),
            GatewayError::Store(JobStoreError::InvalidPayload(_)) => (StatusCode::BAD_REQUEST, "invalid_payload"),
            GatewayError::Store(JobStoreError::ConflictingTargetAndPayload(_)) => {
                (StatusCode::BAD_REQUEST, "conflicting_target_and_payload")
            }
            GatewayError::Store(JobStoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            GatewayError::Store(JobStoreError::StorageUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
            }
            GatewayError::Scheduler(SchedulerError::NotDue) => (StatusCode::CONFLICT, "not_due"),
            GatewayError::Scheduler(SchedulerError::Store(inner)) => GatewayError::Store(clone_store_err(inner)).status_and_kind(),
            GatewayError::Scheduler(SchedulerError::Dispatch(DispatchError::LaneQueueFull(_))) => {
                (StatusCode::TOO_MANY_REQUESTS, "lane_queue_full")
            }
        }
    }
}

fn clone_store_err(e: &JobStoreError) -> JobStoreError {
    match e {
        JobStoreError::InvalidSchedule(s) => JobStoreError::InvalidSchedule(s.clone()),
        JobStoreError::InvalidPayload(s) => JobStoreError::InvalidPayload(s.clone()),
        JobStoreError::ConflictingTargetAndPayload(s) => JobStoreError::ConflictingTargetAndPayload(s.clone()),
        JobStoreError::NotFound(s) => JobStoreError::NotFound(s.clone()),
        JobStoreError::StorageUnavailable(s) => JobStoreError::StorageUnavailable(s.clone()),
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let body = Json(json!({ "error": kind, "message": self.to_string() }));
        (status, body).into_response()
    }
}

type GatewayResult<T> = Result<T, GatewayError>;

// ─── Health / status ──────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "gatehouse" }))
}

/// `cron.status`: `ok` / `degraded` / `halted` based on store availability
/// and whether the Scheduler has ticked within 2x the tick floor (§6 "Exit
/// and health").
pub async fn status(State(state): State<GatewayState>) -> impl IntoResponse {
    let store_available = state.store.is_available().await;
    let last_tick_ms = state.scheduler.last_tick_ms();
    let tick_floor_ms = state.scheduler.tick_floor_ms();
    let now_ms = chrono::Utc::now().timestamp_millis();
    let stale = last_tick_ms != 0 && now_ms - last_tick_ms > 2 * tick_floor_ms;

    let overall = if !store_available {
        "degraded"
    } else if stale {
        "halted"
    } else {
        "ok"
    };

    Json(json!({
        "status": overall,
        "store_available": store_available,
        "last_tick_ms": last_tick_ms,
        "tick_floor_ms": tick_floor_ms,
    }))
}

// ─── Job CRUD (cron.add / cron.update / cron.remove / cron.list) ─────────────

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    pub schedule: Schedule,
    pub session_target: SessionTarget,
    #[serde(default = "default_wake_mode")]
    pub wake_mode: WakeMode,
    pub payload: Payload,
    #[serde(default)]
    pub isolation: Option<Isolation>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub delete_after_run: bool,
}

fn default_wake_mode() -> WakeMode {
    WakeMode::Now
}

fn default_true() -> bool {
    true
}

pub async fn create_job(
    State(state): State<GatewayState>,
    Json(req): Json<CreateJobRequest>,
) -> GatewayResult<impl IntoResponse> {
    let now = chrono::Utc::now();
    let wake_now = req.wake_mode == WakeMode::Now;
    let job = Job::new(
        None,
        req.name,
        req.description,
        req.agent_id,
        req.schedule,
        req.session_target,
        req.wake_mode,
        req.payload,
        req.isolation,
        req.enabled,
        req.delete_after_run,
        now,
    )?;
    let job = state.store.add(job).await?;
    if wake_now {
        state.scheduler.wake();
    }
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn list_jobs(State(state): State<GatewayState>) -> GatewayResult<impl IntoResponse> {
    Ok(Json(state.store.list().await?))
}

pub async fn get_job(State(state): State<GatewayState>, Path(job_id): Path<JobId>) -> GatewayResult<impl IntoResponse> {
    Ok(Json(state.store.get(&job_id).await?))
}

pub async fn update_job(
    State(state): State<GatewayState>,
    Path(job_id): Path<JobId>,
    Json(patch): Json<JobPatch>,
) -> GatewayResult<impl IntoResponse> {
    let job = state.store.update(&job_id, patch).await?;
    state.scheduler.wake();
    Ok(Json(job))
}

pub async fn remove_job(State(state): State<GatewayState>, Path(job_id): Path<JobId>) -> GatewayResult<impl IntoResponse> {
    state.store.remove(&job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── cron.run ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct RunJobRequest {
    /// `"force"` ignores `enabled`/`next_due_ms`; any other value (or
    /// absence) requires the job to currently be due.
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunJobResponse {
    pub run_id: String,
}

pub async fn run_job(
    State(state): State<GatewayState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<RunJobRequest>,
) -> GatewayResult<impl IntoResponse> {
    let force = req.mode.as_deref() == Some("force");
    let run_id = state.scheduler.run_now(&job_id, force).await?;
    Ok(Json(RunJobResponse { run_id }))
}

// ─── cron.runs ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct RunsQuery {
    pub limit: Option<usize>,
}

pub async fn job_runs(
    State(state): State<GatewayState>,
    Path(job_id): Path<JobId>,
    Query(q): Query<RunsQuery>,
) -> GatewayResult<impl IntoResponse> {
    Ok(Json(state.store.runs(&job_id, q.limit).await?))
}

// ─── Immediate system event ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ImmediateEventRequest {
    /// `"now"` or `"next-heartbeat"`.
    pub mode: String,
    pub text: String,
    #[serde(default)]
    pub agent_id: Option<String>,
}

pub async fn post_event(
    State(state): State<GatewayState>,
    Json(req): Json<ImmediateEventRequest>,
) -> GatewayResult<impl IntoResponse> {
    let wake_mode = if req.mode == "next-heartbeat" {
        WakeMode::NextHeartbeat
    } else {
        WakeMode::Now
    };
    let run_id = state.scheduler.emit_system_event(req.agent_id, req.text, wake_mode).await?;
    Ok(Json(RunJobResponse { run_id }))
}
