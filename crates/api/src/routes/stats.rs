use axum::{
    Json,
    extract::{Query, State},
};
use livepoll_services::realtime::SessionStats;
use serde::Deserialize;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsParams {
    pub session_id: Option<String>,
}

pub async fn session_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<SessionStats>, ApiError> {
    let session_id = params
        .session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("sessionId is required".to_string()))?;

    Ok(Json(state.services.hub.session_stats(&session_id).await))
}
