use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use dbobfuscator_core::models::{ObfuscationPlan, RunProgress};
use dbobfuscator_core::{ConnectionInfo, RunRequest};
use serde::{Deserialize, Serialize};

use super::{AdminAuth, ApiErr, AppState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "Status")]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscationStarted {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "ProcessId")]
    pub process_id: String,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiErr> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiErr::bad_request(rejection.body_text()))
}

// ---------- POST /schema-info ----------

pub async fn schema_info(
    _auth: AdminAuth,
    State(state): State<AppState>,
    payload: Result<Json<ConnectionInfo>, JsonRejection>,
) -> Result<Json<ObfuscationPlan>, ApiErr> {
    let info = body(payload)?;
    tracing::info!(target_db = %info, "Collecting schema info");

    let plan = state
        .service
        .schema_info(&info)
        .await
        .map_err(ApiErr::internal)?;
    Ok(Json(plan))
}

// ---------- POST /obfuscate ----------

pub async fn obfuscate(
    _auth: AdminAuth,
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<ObfuscationStarted>, ApiErr> {
    let request = body(payload)?;
    tracing::info!(
        origin = %request.origin,
        destination = %request.destination,
        tables = request.plan.len(),
        "Obfuscation requested"
    );

    // The run outlives the request; its handle is not needed to poll it.
    let handle = state
        .service
        .submit(request)
        .await
        .map_err(ApiErr::internal)?;

    Ok(Json(ObfuscationStarted {
        status: "Obfuscation was started.".to_string(),
        process_id: handle.run_id().to_string(),
    }))
}

// ---------- GET /status/{process_id} ----------

pub async fn status(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(process_id): Path<String>,
) -> Result<Json<RunProgress>, ApiErr> {
    state
        .service
        .status(&process_id)
        .map(Json)
        .ok_or_else(|| ApiErr::bad_request("Entry with this process id doesn't exist"))
}

// ---------- POST /empty-progress-ctx ----------

pub async fn empty_progress_ctx(
    _auth: AdminAuth,
    State(state): State<AppState>,
) -> Json<StatusResponse> {
    state.service.clear_progress();
    Json(StatusResponse {
        status: "OK".to_string(),
    })
}
