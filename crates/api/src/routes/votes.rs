use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
};
use livepoll_services::pipeline::{SubmitMeta, VoteAccepted, VoteRequest};
use serde::Serialize;

use crate::{error::ApiError, extractors::JsonBody, state::AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVoteResponse {
    #[serde(flatten)]
    pub accepted: VoteAccepted,
    pub message: &'static str,
}

/// Queues the vote and answers before it is processed.
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<VoteRequest>,
) -> Result<(StatusCode, Json<SubmitVoteResponse>), ApiError> {
    let meta = SubmitMeta {
        ip_address: client_ip(&headers),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let accepted = state.services.ingestion.submit(body, meta).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitVoteResponse {
            accepted,
            message: "Vote submitted for processing",
        }),
    ))
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
