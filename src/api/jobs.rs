use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::info;

use super::error::ApiResult;
use crate::{
    app::AppState,
    domain::{AnalysisJob, ModerationJobRequest},
};

pub(crate) async fn submit(
    State(state): State<AppState>,
    Json(request): Json<ModerationJobRequest>,
) -> ApiResult<(StatusCode, Json<AnalysisJob>)> {
    let job = state.session().submit(request)?;
    info!(job_id = %job.id, "job accepted");
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Latest job, settled or not; `204` before the first submission.
pub(crate) async fn current(State(state): State<AppState>) -> Response {
    match state.session().current_job() {
        Some(job) => Json(job).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub(crate) async fn cancel(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let job_id = state.session().cancel()?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))))
}

pub(crate) async fn retry(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<AnalysisJob>)> {
    let job = state.session().retry()?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}
