use axum::{
    Json,
    extract::{Path, State},
};
use livepoll_db::models::QuestionResult;

use crate::{
    error::{ApiError, parse_object_id},
    state::AppState,
};

pub async fn session_results(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sid = parse_object_id("sessionId", &session_id)?;
    let results = state.services.aggregator.session_results(&sid).await?;

    Ok(Json(serde_json::json!({
        "sessionId": session_id,
        "results": results,
    })))
}

pub async fn question_results(
    State(state): State<AppState>,
    Path((session_id, question_id)): Path<(String, String)>,
) -> Result<Json<QuestionResult>, ApiError> {
    let sid = parse_object_id("sessionId", &session_id)?;
    let qid = parse_object_id("questionId", &question_id)?;
    let results = state.services.aggregator.results(&sid, &qid).await?;
    Ok(Json(results))
}
