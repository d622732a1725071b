use chrono::{DateTime, Utc};
use livepoll_db::models::QuestionResult;
use serde::{Deserialize, Serialize};

use super::topics;

/// Every record the pipeline puts on the bus. The `type` tag selects the
/// schema; each topic carries exactly one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PollEvent {
    #[serde(rename = "vote.submitted")]
    VoteSubmitted(VoteSubmittedEvent),
    #[serde(rename = "results.updated")]
    ResultsUpdated(ResultsUpdatedEvent),
}

impl PollEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            PollEvent::VoteSubmitted(_) => topics::VOTES_SUBMITTED,
            PollEvent::ResultsUpdated(_) => topics::RESULTS_UPDATED,
        }
    }

    /// Partition key: the session id.
    pub fn session_id(&self) -> &str {
        match self {
            PollEvent::VoteSubmitted(e) => &e.session_id,
            PollEvent::ResultsUpdated(e) => &e.session_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSubmittedEvent {
    pub event_id: String,
    /// Assigned at submission so the acknowledgment can name the vote.
    pub vote_id: String,
    pub session_id: String,
    pub question_id: String,
    pub participant_id: String,
    pub selected_options: Vec<i32>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsUpdatedEvent {
    pub event_id: String,
    pub session_id: String,
    pub question_id: String,
    pub results: QuestionResult,
    pub timestamp: DateTime<Utc>,
}
