use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::warn;

use crate::error::ModerationError;

pub(crate) type ApiResult<T> = Result<T, ApiError>;

/// Maps [`ModerationError`] onto a status code and a JSON body naming the
/// offending field, record or word.
#[derive(Debug)]
pub(crate) struct ApiError(pub(crate) ModerationError);

impl From<ModerationError> for ApiError {
    fn from(error: ModerationError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.0.to_string();
        let (status, body) = match &self.0 {
            ModerationError::Validation(reason) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation",
                    "reason": reason,
                    "field": reason.field(),
                    "message": message,
                }),
            ),
            ModerationError::InFlightConflict { running_job } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "in_flight",
                    "runningJob": running_job,
                    "message": message,
                }),
            ),
            ModerationError::ConsistencyViolation { subject, reason } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": "consistency",
                    "reason": reason,
                    "subject": subject,
                    "message": message,
                }),
            ),
            ModerationError::PartialBatchFailure { succeeded, failed } => (
                StatusCode::MULTI_STATUS,
                json!({
                    "error": "partial_batch_failure",
                    "succeeded": succeeded,
                    "failed": failed,
                    "message": message,
                }),
            ),
            ModerationError::Collaborator { operation, .. } => {
                warn!(operation, error = %message, "collaborator call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    json!({
                        "error": "collaborator",
                        "operation": operation,
                        "message": message,
                    }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
