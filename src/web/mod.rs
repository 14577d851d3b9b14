pub mod activities;
pub mod recommendations;
pub mod sessions;

use crate::error::EngineError;
use crate::state::SharedState;
use axum::{http::StatusCode, routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/activities", activities::router(state.clone()))
        .nest("/api/recommendations", recommendations::router(state.clone()))
        .nest("/api/sessions", sessions::router(state))
}

pub(crate) fn engine_error_status(err: EngineError) -> StatusCode {
    match err {
        EngineError::UnknownActivity(activity) => {
            tracing::warn!("Rejected feedback for unknown activity {}", activity);
            StatusCode::BAD_REQUEST
        }
        EngineError::InsufficientCandidates { available } => {
            tracing::warn!("Insufficient candidates: {}", available);
            StatusCode::CONFLICT
        }
        EngineError::Persistence(e) => {
            tracing::error!("Storage failure: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
