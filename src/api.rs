pub(crate) mod blacklist;
pub(crate) mod blocked_words;
pub(crate) mod comments;
pub(crate) mod error;
pub(crate) mod health;
pub(crate) mod jobs;
pub(crate) mod metrics;

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/jobs", post(jobs::submit))
        .route("/v1/jobs/current", get(jobs::current))
        .route("/v1/jobs/current/cancel", post(jobs::cancel))
        .route("/v1/jobs/retry", post(jobs::retry))
        .route("/v1/comments", get(comments::list))
        .route("/v1/comments/selection", post(comments::change_selection))
        .route("/v1/comments/delete-selected", post(comments::delete_selected))
        .route("/v1/comments/delete-visible", post(comments::delete_visible))
        .route("/v1/comments/export", get(comments::export))
        .route(
            "/v1/comments/history",
            post(comments::load_history).delete(comments::discard_history),
        )
        .route("/v1/comments/{id}", delete(comments::delete_one))
        .route("/v1/comments/{id}/escalate", post(comments::escalate))
        .route("/v1/blacklist", get(blacklist::list).post(blacklist::add))
        .route("/v1/blacklist/refresh", post(blacklist::refresh))
        .route("/v1/blacklist/{author}", delete(blacklist::remove))
        .route(
            "/v1/blocked-words",
            get(blocked_words::list).post(blocked_words::add),
        )
        .route("/v1/blocked-words/refresh", post(blocked_words::refresh))
        .route(
            "/v1/blocked-words/{id}",
            put(blocked_words::update).delete(blocked_words::remove),
        )
        .route("/v1/blocked-words/{id}/toggle", patch(blocked_words::toggle))
        .with_state(state)
}
