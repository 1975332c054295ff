use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::error::ApiResult;
use crate::{
    app::AppState,
    domain::{BlacklistEntry, NewBlacklistEntry},
};

pub(crate) async fn list(State(state): State<AppState>) -> Json<Vec<BlacklistEntry>> {
    Json(state.session().blacklist().list())
}

pub(crate) async fn refresh(State(state): State<AppState>) -> ApiResult<Json<Vec<BlacklistEntry>>> {
    Ok(Json(state.session().blacklist().refresh().await?))
}

pub(crate) async fn add(
    State(state): State<AppState>,
    Json(entry): Json<NewBlacklistEntry>,
) -> ApiResult<(StatusCode, Json<BlacklistEntry>)> {
    let saved = state.session().blacklist().add(entry).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub(crate) async fn remove(
    State(state): State<AppState>,
    Path(author): Path<String>,
) -> ApiResult<Response> {
    if state.session().blacklist().remove(&author).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not_listed", "subject": author })),
        )
            .into_response())
    }
}
