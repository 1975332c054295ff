use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::error::{ApiError, ApiResult};
use crate::{
    app::AppState,
    domain::{BlacklistEntry, DateRange, Scope, VerdictFilter},
    error::{ModerationError, RejectionReason},
    moderation::{
        DeleteOutcome,
        session::{CommentPage, SelectionChange},
    },
};

/// Scope parameters shared by listing and history loading.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScopeQuery {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    start_date: Option<NaiveDate>,
    #[serde(default)]
    end_date: Option<NaiveDate>,
    #[serde(default)]
    verdict: Option<VerdictFilter>,
}

impl ScopeQuery {
    fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.verdict.is_none()
    }

    fn into_scope(self) -> Result<Scope, ApiError> {
        let date_range = match (self.start_date, self.end_date) {
            (None, None) => None,
            (Some(start), Some(end)) if start <= end => Some(DateRange::new(start, end)),
            (Some(_), Some(_)) => {
                return Err(ModerationError::Validation(RejectionReason::InvertedRange).into());
            }
            _ => {
                return Err(ModerationError::Validation(RejectionReason::MissingDateRange).into());
            }
        };
        Ok(Scope {
            url: self
                .url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            date_range,
            verdict: self.verdict.unwrap_or_default(),
        })
    }
}

/// Current page, or the page after switching to the queried scope.
pub(crate) async fn list(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Json<CommentPage>> {
    if query.is_empty() {
        return Ok(Json(state.session().page()));
    }
    let scope = query.into_scope()?;
    Ok(Json(state.session().filter(scope)))
}

pub(crate) async fn change_selection(
    State(state): State<AppState>,
    Json(change): Json<SelectionChange>,
) -> impl IntoResponse {
    let selected = state.session().change_selection(change);
    Json(json!({ "selected": selected }))
}

pub(crate) async fn delete_selected(
    State(state): State<AppState>,
) -> ApiResult<Json<DeleteOutcome>> {
    Ok(Json(state.session().delete_selected().await?))
}

pub(crate) async fn delete_visible(
    State(state): State<AppState>,
) -> ApiResult<Json<DeleteOutcome>> {
    Ok(Json(state.session().delete_all_in_scope().await?))
}

pub(crate) async fn delete_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteOutcome>> {
    Ok(Json(state.session().delete_one(&id).await?))
}

pub(crate) async fn export(State(state): State<AppState>) -> ApiResult<Response> {
    let export = state.session().export_csv().await?;
    let disposition = format!("attachment; filename=\"{}\"", export.file_name);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.bytes,
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EscalateBody {
    #[serde(default)]
    reason: Option<String>,
}

pub(crate) async fn escalate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<EscalateBody>>,
) -> ApiResult<(StatusCode, Json<BlacklistEntry>)> {
    let reason = body.and_then(|Json(body)| body.reason);
    let entry = state.session().escalate(&id, reason).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Pulls stored comments for the scope into the result set.
pub(crate) async fn load_history(
    State(state): State<AppState>,
    Json(query): Json<ScopeQuery>,
) -> ApiResult<Json<CommentPage>> {
    let scope = query.into_scope()?;
    state.session().load_history(scope).await?;
    Ok(Json(state.session().page()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryTarget {
    url: String,
}

pub(crate) async fn discard_history(
    State(state): State<AppState>,
    Query(target): Query<HistoryTarget>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state.session().discard_history(&target.url).await?;
    Ok(Json(json!({ "url": target.url.trim(), "deleted": deleted })))
}
