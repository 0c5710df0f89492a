//! HTTP handlers for the trigger and health endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    /// Job name to trigger, e.g. "bullseye_press"
    pub job: String,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub triggered: bool,
}

/// Fire-and-forget job trigger
///
/// Always answers HTTP 200: "already running" and "unknown job" are
/// expected outcomes, reported through the boolean only. The caller
/// never sees run status or error detail; those go to the logs and the
/// notifier.
pub async fn trigger_job(
    State(state): State<AppState>,
    Json(payload): Json<TriggerRequest>,
) -> Json<TriggerResponse> {
    let action = match state.registry.resolve(&payload.job) {
        Ok(action) => action,
        Err(e) => {
            info!("Trigger rejected: {}", e);
            return Json(TriggerResponse { triggered: false });
        }
    };

    let slot = match state.guard.try_acquire(&action.target) {
        Some(slot) => slot,
        None => {
            info!(
                "Trigger for '{}' denied: target already running",
                action.target
            );
            return Json(TriggerResponse { triggered: false });
        }
    };

    info!("Trigger accepted for '{}'", action.target);
    state.runner.dispatch(action, slot);

    Json(TriggerResponse { triggered: true })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub time: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: i64,
    /// Targets currently holding a run slot
    pub running: Vec<String>,
}

/// Liveness probe, unrelated to job semantics
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = chrono::Utc::now();
    Json(HealthResponse {
        status: "ok",
        time: now,
        uptime_seconds: (now - state.started_at).num_seconds(),
        running: state
            .guard
            .running()
            .into_iter()
            .map(|handle| handle.target)
            .collect(),
    })
}
