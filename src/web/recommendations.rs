use crate::domain::engine::CycleStatus;
use crate::services::session::FeedbackSession;
use crate::state::SharedState;
use crate::web::engine_error_status;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

pub const NO_ACTIVITIES_MESSAGE: &str = "No activities available right now. Please check back later.";

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub session_id: Option<Uuid>,
    pub status: CycleStatus,
    pub activities: Vec<String>,
    pub current: Option<String>,
    pub message: String,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(recommend))
        .with_state(state)
}

async fn recommend(
    State(state): State<SharedState>,
) -> Result<Json<RecommendationResponse>, StatusCode> {
    let now = Utc::now();
    let outcome = state
        .recommendations
        .recommend(now)
        .await
        .map_err(engine_error_status)?;

    if outcome.selected.is_empty() {
        return Ok(Json(RecommendationResponse {
            session_id: None,
            status: outcome.status,
            activities: Vec::new(),
            current: None,
            message: NO_ACTIVITIES_MESSAGE.to_string(),
        }));
    }

    let session = FeedbackSession::new(outcome.selected.clone(), now);
    let current = session.current().map(str::to_string);
    let message = match (&outcome.status, &current) {
        (CycleStatus::Degraded, Some(activity)) => format!(
            "Only {} is available right now. How did it make you feel?",
            activity
        ),
        (_, Some(activity)) => format!("How did {} make you feel?", activity),
        (_, None) => NO_ACTIVITIES_MESSAGE.to_string(),
    };

    let session_id = session.id;
    state
        .feedback_sessions
        .write()
        .await
        .insert(session_id, session);

    Ok(Json(RecommendationResponse {
        session_id: Some(session_id),
        status: outcome.status,
        activities: outcome.selected,
        current,
        message,
    }))
}
