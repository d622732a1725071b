use bson::oid::ObjectId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{PipelineError, PipelineResult};
use crate::bus::{EventBus, PollEvent, VoteSubmittedEvent};

/// Body of a vote submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub question_id: String,
    #[serde(default)]
    pub participant_id: String,
    #[serde(default)]
    pub selected_options: Vec<i32>,
}

/// Transport details recorded on the event.
#[derive(Debug, Clone, Default)]
pub struct SubmitMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Provisional acknowledgment: the vote is queued, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteAccepted {
    pub vote_id: String,
    pub event_id: String,
    pub status: String,
}

/// Synchronous half of the pipeline: validate, build the event, publish.
#[derive(Clone)]
pub struct VoteIngestion {
    bus: EventBus,
}

impl VoteIngestion {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub async fn submit(&self, request: VoteRequest, meta: SubmitMeta) -> PipelineResult<VoteAccepted> {
        validate(&request)?;

        let event = VoteSubmittedEvent {
            event_id: Uuid::new_v4().to_string(),
            vote_id: ObjectId::new().to_hex(),
            session_id: request.session_id,
            question_id: request.question_id,
            participant_id: request.participant_id,
            selected_options: request.selected_options,
            timestamp: Utc::now(),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
        };
        let accepted = VoteAccepted {
            vote_id: event.vote_id.clone(),
            event_id: event.event_id.clone(),
            status: "pending".to_string(),
        };

        let event = PollEvent::VoteSubmitted(event);
        if let Err(e) = self.bus.publish_event(&event).await {
            warn!(session_id = event.session_id(), %e, "Vote could not be queued");
            return Err(e.into());
        }

        info!(
            session_id = event.session_id(),
            vote_id = %accepted.vote_id,
            "Vote queued"
        );
        Ok(accepted)
    }
}

fn validate(request: &VoteRequest) -> PipelineResult<()> {
    let missing = [
        ("sessionId", request.session_id.trim().is_empty()),
        ("questionId", request.question_id.trim().is_empty()),
        ("participantId", request.participant_id.trim().is_empty()),
        ("selectedOptions", request.selected_options.is_empty()),
    ];
    if let Some((field, _)) = missing.iter().find(|(_, empty)| *empty) {
        return Err(PipelineError::MalformedInput(format!("{field} is required")));
    }

    for (field, value) in [("sessionId", &request.session_id), ("questionId", &request.question_id)] {
        if ObjectId::parse_str(value).is_err() {
            return Err(PipelineError::MalformedInput(format!("{field} is not a valid id")));
        }
    }

    if request.selected_options.iter().any(|o| *o < 0) {
        return Err(PipelineError::MalformedInput(
            "selectedOptions must be non-negative indices".to_string(),
        ));
    }
    Ok(())
}
