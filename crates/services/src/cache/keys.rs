use std::time::Duration;

use bson::oid::ObjectId;

pub const SESSION_TTL: Duration = Duration::from_secs(48 * 60 * 60);
pub const VOTE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const VOTE_LOCK_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const RESULTS_TTL: Duration = Duration::from_secs(60 * 60);

pub fn session(session_id: &ObjectId) -> String {
    format!("session:{}", session_id.to_hex())
}

pub fn organizer_sessions(organizer_id: &ObjectId) -> String {
    format!("organizer_sessions:{}", organizer_id.to_hex())
}

pub fn session_join_code(join_code: &str) -> String {
    format!("session_joincode:{join_code}")
}

pub fn vote(vote_id: &ObjectId) -> String {
    format!("vote:{}", vote_id.to_hex())
}

pub fn session_votes(session_id: &ObjectId) -> String {
    format!("session_votes:{}", session_id.to_hex())
}

pub fn participant_vote(session_id: &ObjectId, question_id: &ObjectId, participant_id: &str) -> String {
    format!(
        "participant_vote:{}:{}:{participant_id}",
        session_id.to_hex(),
        question_id.to_hex()
    )
}

pub fn vote_lock(session_id: &ObjectId, question_id: &ObjectId, participant_id: &str) -> String {
    format!(
        "vote_lock:{}:{}:{participant_id}",
        session_id.to_hex(),
        question_id.to_hex()
    )
}

pub fn results(session_id: &ObjectId, question_id: &ObjectId) -> String {
    format!("results:{}:{}", session_id.to_hex(), question_id.to_hex())
}
