use crate::services::recommendations::ActivityStatus;
use crate::state::SharedState;
use crate::web::engine_error_status;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_activities))
        .with_state(state)
}

async fn list_activities(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ActivityStatus>>, StatusCode> {
    let statuses = state
        .recommendations
        .activity_statuses()
        .await
        .map_err(engine_error_status)?;
    Ok(Json(statuses))
}
