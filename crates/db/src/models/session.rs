use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// One live poll owned by an organizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub organizer_id: ObjectId,
    pub title: String,
    /// Server generated, unique across sessions.
    pub join_code: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub questions: Vec<Question>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Session {
    pub const COLLECTION: &'static str = "sessions";

    pub fn question(&self, question_id: &ObjectId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == question_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Draft,
    Active,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Draft => "draft",
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: ObjectId,
    pub text: String,
    pub options: Vec<String>,
    #[serde(rename = "type", default)]
    pub question_type: QuestionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    Single,
    Multiple,
}
