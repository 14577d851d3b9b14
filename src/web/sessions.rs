use crate::services::session::FeedbackSession;
use crate::state::SharedState;
use crate::web::engine_error_status;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct FeedbackPayload {
    pub score: i16,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub activity: String,
    pub saved_score: i16,
    pub next: Option<String>,
    pub finished: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: FeedbackSession,
    pub current: Option<String>,
    pub finished: bool,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/:id", get(show_session))
        .route("/:id/feedback", post(submit_feedback))
        .with_state(state)
}

async fn show_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, StatusCode> {
    let sessions = state.feedback_sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(SessionView {
        current: session.current().map(str::to_string),
        finished: session.is_finished(),
        session: session.clone(),
    }))
}

async fn submit_feedback(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FeedbackPayload>,
) -> Result<Json<FeedbackResponse>, StatusCode> {
    let activity = {
        let sessions = state.feedback_sessions.read().await;
        let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
        let current = session.current().map(str::to_string);
        current.ok_or(StatusCode::CONFLICT)?
    };

    let saved_score = state
        .recommendations
        .submit_feedback(&activity, payload.score, Utc::now())
        .await
        .map_err(engine_error_status)?;

    let mut sessions = state.feedback_sessions.write().await;
    let session = sessions.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    // Another submission for this session may have advanced it meanwhile.
    if session.current() != Some(activity.as_str()) {
        return Err(StatusCode::CONFLICT);
    }
    let next = session
        .advance()
        .map_err(|_| StatusCode::CONFLICT)?
        .map(str::to_string);

    let response = match &next {
        Some(upcoming) => FeedbackResponse {
            activity,
            saved_score,
            message: format!("How did {} make you feel?", upcoming),
            next: next.clone(),
            finished: false,
        },
        None => {
            sessions.remove(&id);
            FeedbackResponse {
                activity,
                saved_score,
                next: None,
                finished: true,
                message: "Thank you for your feedback!".to_string(),
            }
        }
    };
    Ok(Json(response))
}
