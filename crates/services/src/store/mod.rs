//! Document-store seams. The MongoDB DAOs in [`crate::dao`] are the
//! production implementations; [`memory::MemoryStore`] backs tests and
//! single-process development runs.

pub mod memory;

use async_trait::async_trait;
use bson::oid::ObjectId;
use livepoll_db::models::{Session, SessionStatus, Vote, VoteTally};

use crate::dao::base::DaoResult;

pub use memory::MemoryStore;

/// System of record for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fails with `DuplicateKey` when the join code is already taken.
    async fn insert(&self, session: &Session) -> DaoResult<()>;

    async fn find_by_id(&self, id: ObjectId) -> DaoResult<Session>;

    async fn find_by_join_code(&self, join_code: &str) -> DaoResult<Session>;

    /// Newest first.
    async fn list_by_organizer(&self, organizer_id: ObjectId) -> DaoResult<Vec<Session>>;

    /// Returns `false` when no session matched.
    async fn update_status(&self, id: ObjectId, status: SessionStatus) -> DaoResult<bool>;
}

/// System of record for votes.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Fails with `DuplicateKey` when the participant already voted on the
    /// question.
    async fn insert(&self, vote: &Vote) -> DaoResult<()>;

    async fn find_by_id(&self, id: ObjectId) -> DaoResult<Vote>;

    /// Groups the question's votes by selected option and counts distinct
    /// participants.
    async fn tally(&self, session_id: ObjectId, question_id: ObjectId) -> DaoResult<VoteTally>;
}
