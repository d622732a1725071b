use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use bson::{oid::ObjectId, DateTime};
use livepoll_db::models::{Session, SessionStatus, Vote, VoteTally};
use parking_lot::RwLock;

use super::{SessionStore, VoteStore};
use crate::dao::base::{DaoError, DaoResult};

type VoteKey = (ObjectId, ObjectId, String);

/// In-process document store with the same uniqueness guarantees as the
/// MongoDB indexes: unique join codes and one vote per
/// (session, question, participant).
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<ObjectId, Session>>,
    votes: RwLock<VoteTable>,
}

#[derive(Default)]
struct VoteTable {
    by_id: HashMap<ObjectId, Vote>,
    by_participant: HashMap<VoteKey, ObjectId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vote_count(&self) -> usize {
        self.votes.read().by_id.len()
    }

    pub fn votes_for(&self, session_id: ObjectId, question_id: ObjectId) -> Vec<Vote> {
        self.votes
            .read()
            .by_id
            .values()
            .filter(|v| v.session_id == session_id && v.question_id == question_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: &Session) -> DaoResult<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id) {
            return Err(DaoError::DuplicateKey(format!("_id {}", session.id)));
        }
        if sessions.values().any(|s| s.join_code == session.join_code) {
            return Err(DaoError::DuplicateKey(format!(
                "join_code {}",
                session.join_code
            )));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> DaoResult<Session> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(DaoError::NotFound)
    }

    async fn find_by_join_code(&self, join_code: &str) -> DaoResult<Session> {
        self.sessions
            .read()
            .values()
            .find(|s| s.join_code == join_code)
            .cloned()
            .ok_or(DaoError::NotFound)
    }

    async fn list_by_organizer(&self, organizer_id: ObjectId) -> DaoResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.organizer_id == organizer_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn update_status(&self, id: ObjectId, status: SessionStatus) -> DaoResult<bool> {
        match self.sessions.write().get_mut(&id) {
            Some(session) => {
                session.status = status;
                session.updated_at = DateTime::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn insert(&self, vote: &Vote) -> DaoResult<()> {
        let mut table = self.votes.write();
        let key = (vote.session_id, vote.question_id, vote.participant_id.clone());
        if table.by_participant.contains_key(&key) {
            return Err(DaoError::DuplicateKey(format!(
                "vote by {} on question {}",
                vote.participant_id, vote.question_id
            )));
        }
        if table.by_id.contains_key(&vote.id) {
            return Err(DaoError::DuplicateKey(format!("_id {}", vote.id)));
        }
        table.by_participant.insert(key, vote.id);
        table.by_id.insert(vote.id, vote.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> DaoResult<Vote> {
        self.votes
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(DaoError::NotFound)
    }

    async fn tally(&self, session_id: ObjectId, question_id: ObjectId) -> DaoResult<VoteTally> {
        let table = self.votes.read();
        let mut tally = VoteTally::default();
        let mut voters = BTreeSet::new();
        for vote in table
            .by_id
            .values()
            .filter(|v| v.session_id == session_id && v.question_id == question_id)
        {
            for option in &vote.selected_options {
                *tally.counts.entry(*option as i64).or_insert(0) += 1;
            }
            voters.insert(vote.participant_id.as_str());
        }
        tally.unique_voters = voters.len() as u64;
        Ok(tally)
    }
}
