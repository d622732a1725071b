use std::sync::Arc;
use std::time::Duration;

use bson::oid::ObjectId;
use livepoll_db::models::{QuestionResult, Session, Vote};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::{CacheResult, KvCache, keys};

/// Outcome of a cache write. The document store stays authoritative, so a
/// `Degraded` write has already been logged and callers may drop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheWrite {
    Stored,
    Degraded(String),
}

impl CacheWrite {
    pub fn is_degraded(&self) -> bool {
        matches!(self, CacheWrite::Degraded(_))
    }

    fn and(self, other: CacheWrite) -> CacheWrite {
        match self {
            CacheWrite::Stored => other,
            degraded => degraded,
        }
    }
}

/// Typed cache-aside helper owning key naming and TTLs for sessions, votes
/// and results.
#[derive(Clone)]
pub struct CacheAside {
    cache: Arc<dyn KvCache>,
}

impl CacheAside {
    pub fn new(cache: Arc<dyn KvCache>) -> Self {
        Self { cache }
    }

    pub fn backend(&self) -> &Arc<dyn KvCache> {
        &self.cache
    }

    // --- sessions ---

    pub async fn cached_session(&self, session_id: &ObjectId) -> Option<Session> {
        self.read_json(&keys::session(session_id)).await
    }

    /// Writes `session:{id}` and the join code mapping. The organizer index
    /// is written by [`index_organizer_sessions`](Self::index_organizer_sessions).
    pub async fn cache_session(&self, session: &Session) -> CacheWrite {
        let stored = self
            .write_json(&keys::session(&session.id), session, keys::SESSION_TTL)
            .await;

        let join_code = self
            .degrade_on_err(
                "session_joincode",
                self.cache
                    .set(
                        &keys::session_join_code(&session.join_code),
                        &session.id.to_hex(),
                        keys::SESSION_TTL,
                    )
                    .await,
            );

        debug!(session_id = %session.id, "Session cached");
        stored.and(join_code)
    }

    /// Adds `sessions` to `organizer_sessions:{organizerId}`, scored by
    /// creation time.
    pub async fn index_organizer_sessions(
        &self,
        organizer_id: &ObjectId,
        sessions: &[Session],
    ) -> CacheWrite {
        let key = keys::organizer_sessions(organizer_id);
        let mut outcome = CacheWrite::Stored;
        for session in sessions.iter().filter(|s| s.organizer_id == *organizer_id) {
            let score = session.created_at.timestamp_millis() as f64 / 1000.0;
            let added = self.degrade_on_err(
                "organizer_sessions",
                self.cache
                    .sorted_add(&key, &session.id.to_hex(), score, keys::SESSION_TTL)
                    .await,
            );
            outcome = outcome.and(added);
        }
        outcome
    }

    pub async fn invalidate_session(&self, session_id: &ObjectId) -> CacheWrite {
        self.degrade_on_err("session", self.cache.delete(&keys::session(session_id)).await)
    }

    pub async fn organizer_session_ids(&self, organizer_id: &ObjectId) -> Vec<ObjectId> {
        match self
            .cache
            .sorted_members_desc(&keys::organizer_sessions(organizer_id))
            .await
        {
            Ok(members) => members
                .iter()
                .filter_map(|m| ObjectId::parse_str(m).ok())
                .collect(),
            Err(e) => {
                warn!(%organizer_id, %e, "Cache read failed for organizer sessions");
                Vec::new()
            }
        }
    }

    pub async fn session_id_for_join_code(&self, join_code: &str) -> Option<ObjectId> {
        self.read_id(&keys::session_join_code(join_code)).await
    }

    // --- votes ---

    /// Set-if-absent dedup guard for one participant's vote on a question.
    /// Errors here are not degraded: without the guard the vote cannot be
    /// accepted safely, so the caller retries.
    pub async fn acquire_vote_lock(
        &self,
        session_id: &ObjectId,
        question_id: &ObjectId,
        participant_id: &str,
    ) -> CacheResult<bool> {
        self.cache
            .set_if_absent(
                &keys::vote_lock(session_id, question_id, participant_id),
                "1",
                keys::VOTE_LOCK_TTL,
            )
            .await
    }

    pub async fn release_vote_lock(
        &self,
        session_id: &ObjectId,
        question_id: &ObjectId,
        participant_id: &str,
    ) -> CacheWrite {
        self.degrade_on_err(
            "vote_lock",
            self.cache
                .delete(&keys::vote_lock(session_id, question_id, participant_id))
                .await,
        )
    }

    /// Mirrors a persisted vote: `vote:{id}`, `session_votes:{session}` and
    /// the participant mapping.
    pub async fn cache_vote(&self, vote: &Vote) -> CacheWrite {
        let stored = self
            .write_json(&keys::vote(&vote.id), vote, keys::VOTE_TTL)
            .await;

        let indexed = self.degrade_on_err(
            "session_votes",
            self.cache
                .set_add(
                    &keys::session_votes(&vote.session_id),
                    &vote.id.to_hex(),
                    keys::VOTE_TTL,
                )
                .await,
        );

        let participant = self.degrade_on_err(
            "participant_vote",
            self.cache
                .set(
                    &keys::participant_vote(
                        &vote.session_id,
                        &vote.question_id,
                        &vote.participant_id,
                    ),
                    &vote.id.to_hex(),
                    keys::VOTE_TTL,
                )
                .await,
        );

        stored.and(indexed).and(participant)
    }

    pub async fn cached_vote(&self, vote_id: &ObjectId) -> Option<Vote> {
        self.read_json(&keys::vote(vote_id)).await
    }

    pub async fn session_vote_ids(&self, session_id: &ObjectId) -> Vec<String> {
        match self.cache.set_members(&keys::session_votes(session_id)).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(%session_id, %e, "Cache read failed for session votes");
                Vec::new()
            }
        }
    }

    pub async fn participant_vote_id(
        &self,
        session_id: &ObjectId,
        question_id: &ObjectId,
        participant_id: &str,
    ) -> Option<ObjectId> {
        self.read_id(&keys::participant_vote(session_id, question_id, participant_id))
            .await
    }

    // --- results ---

    pub async fn cached_results(
        &self,
        session_id: &ObjectId,
        question_id: &ObjectId,
    ) -> Option<QuestionResult> {
        self.read_json(&keys::results(session_id, question_id)).await
    }

    pub async fn cache_results(
        &self,
        session_id: &ObjectId,
        question_id: &ObjectId,
        results: &QuestionResult,
    ) -> CacheWrite {
        self.write_json(&keys::results(session_id, question_id), results, keys::RESULTS_TTL)
            .await
    }

    // --- helpers ---

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key, %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                debug!(key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(key, %e, "Cache read failed, falling back to store");
                None
            }
        }
    }

    async fn read_id(&self, key: &str) -> Option<ObjectId> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => ObjectId::parse_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(key, %e, "Cache read failed");
                None
            }
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> CacheWrite {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => return self.degrade_on_err::<()>(key, Err(e.into())),
        };
        self.degrade_on_err(key, self.cache.set(key, &payload, ttl).await)
    }

    fn degrade_on_err<T>(&self, what: &str, result: CacheResult<T>) -> CacheWrite {
        match result {
            Ok(_) => CacheWrite::Stored,
            Err(e) => {
                warn!(what, %e, "Cache write degraded");
                CacheWrite::Degraded(e.to_string())
            }
        }
    }
}
