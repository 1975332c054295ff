use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use super::error::ApiResult;
use crate::{
    app::AppState,
    domain::{BlockedWord, BlockedWordUpdate, NewBlockedWord},
};

pub(crate) async fn list(State(state): State<AppState>) -> Json<Vec<BlockedWord>> {
    Json(state.session().blocked_words().list())
}

pub(crate) async fn refresh(State(state): State<AppState>) -> ApiResult<Json<Vec<BlockedWord>>> {
    Ok(Json(state.session().blocked_words().refresh().await?))
}

pub(crate) async fn add(
    State(state): State<AppState>,
    Json(word): Json<NewBlockedWord>,
) -> ApiResult<(StatusCode, Json<BlockedWord>)> {
    let saved = state.session().blocked_words().add(word).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub(crate) async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<BlockedWordUpdate>,
) -> ApiResult<Json<BlockedWord>> {
    Ok(Json(state.session().blocked_words().update(id, update).await?))
}

pub(crate) async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.session().blocked_words().remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn toggle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<BlockedWord>> {
    Ok(Json(state.session().blocked_words().toggle(id).await?))
}
