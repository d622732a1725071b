use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// A persisted vote. At most one exists per (session, question, participant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub session_id: ObjectId,
    pub question_id: ObjectId,
    /// Opaque token supplied by the client.
    pub participant_id: String,
    pub selected_options: Vec<i32>,
    pub created_at: DateTime,
    #[serde(default)]
    pub processed: bool,
    pub processed_at: Option<DateTime>,
}

impl Vote {
    pub const COLLECTION: &'static str = "votes";
}
