use bson::oid::ObjectId;
use chrono::Utc;
use livepoll_db::models::{QuestionType, Session, SessionStatus};
use livepoll_services::bus::VoteSubmittedEvent;
use livepoll_services::session::{NewQuestion, NewSession, SessionService};
use serde_json::Value;

use super::test_app::TestApp;

pub const COLORS: [&str; 3] = ["Red", "Blue", "Green"];

pub fn new_session(title: &str, options: &[&str], question_type: QuestionType) -> NewSession {
    NewSession {
        organizer_id: ObjectId::new(),
        title: title.to_string(),
        join_code: None,
        questions: vec![NewQuestion {
            text: format!("{title}?"),
            options: options.iter().map(|o| o.to_string()).collect(),
            question_type,
        }],
    }
}

/// Creates a single-question session and opens it for voting.
pub async fn active_session(
    sessions: &SessionService,
    title: &str,
    options: &[&str],
    question_type: QuestionType,
) -> Session {
    let session = sessions
        .create_session(new_session(title, options, question_type))
        .await
        .expect("Failed to create session");
    sessions
        .update_status(&session.id, SessionStatus::Active)
        .await
        .expect("Failed to activate session")
}

/// A vote event as ingestion would have published it.
pub fn vote_event(session: &Session, participant: &str, options: &[i32]) -> VoteSubmittedEvent {
    VoteSubmittedEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        vote_id: ObjectId::new().to_hex(),
        session_id: session.id.to_hex(),
        question_id: session.questions[0].id.to_hex(),
        participant_id: participant.to_string(),
        selected_options: options.to_vec(),
        timestamp: Utc::now(),
        ip_address: None,
        user_agent: None,
    }
}

impl TestApp {
    /// Creates a session over HTTP and activates it. Returns the session
    /// body.
    pub async fn seed_active_session(&self, title: &str, options: &[&str]) -> Value {
        let resp = self
            .client
            .post(self.url("/api/v1/sessions"))
            .json(&serde_json::json!({
                "organizerId": ObjectId::new().to_hex(),
                "title": title,
                "questions": [{
                    "text": format!("{title}?"),
                    "options": options,
                    "type": "single",
                }],
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201);
        let session: Value = resp.json().await.unwrap();

        let resp = self
            .client
            .patch(self.url(&format!(
                "/api/v1/sessions/{}/status",
                session["id"].as_str().unwrap()
            )))
            .json(&serde_json::json!({ "status": "active" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        resp.json().await.unwrap()
    }

    pub async fn submit_vote(
        &self,
        session: &Value,
        participant: &str,
        options: &[i32],
    ) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/votes"))
            .json(&serde_json::json!({
                "sessionId": session["id"],
                "questionId": session["questions"][0]["id"],
                "participantId": participant,
                "selectedOptions": options,
            }))
            .send()
            .await
            .unwrap()
    }
}
