use std::sync::Arc;
use std::time::Duration;

use bson::oid::ObjectId;
use chrono::Utc;
use livepoll_db::models::{Question, QuestionResult, Session};
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{PipelineError, PipelineResult};
use crate::bus::{EventBus, PollEvent, ResultsUpdatedEvent};
use crate::cache::CacheAside;
use crate::dao::base::bounded;
use crate::session::SessionService;
use crate::store::VoteStore;

/// Recomputes per-question results from the vote store, caches the snapshot
/// and announces it on the results topic.
#[derive(Clone)]
pub struct ResultsAggregator {
    votes: Arc<dyn VoteStore>,
    sessions: SessionService,
    cache: CacheAside,
    bus: EventBus,
    store_timeout: Duration,
}

impl ResultsAggregator {
    pub fn new(
        votes: Arc<dyn VoteStore>,
        sessions: SessionService,
        cache: CacheAside,
        bus: EventBus,
        store_timeout: Duration,
    ) -> Self {
        Self {
            votes,
            sessions,
            cache,
            bus,
            store_timeout,
        }
    }

    pub async fn compute(&self, session: &Session, question: &Question) -> PipelineResult<QuestionResult> {
        let tally = bounded(
            self.store_timeout,
            "tally votes",
            self.votes.tally(session.id, question.id),
        )
        .await?;
        Ok(QuestionResult::from_tally(question, &tally))
    }

    /// Recompute, cache (1h) and publish keyed by session so per-session
    /// order holds on the bus.
    pub async fn refresh(&self, session: &Session, question: &Question) -> PipelineResult<QuestionResult> {
        let results = self.compute(session, question).await?;
        let _ = self.cache.cache_results(&session.id, &question.id, &results).await;

        let event = PollEvent::ResultsUpdated(ResultsUpdatedEvent {
            event_id: Uuid::new_v4().to_string(),
            session_id: session.id.to_hex(),
            question_id: question.id.to_hex(),
            results: results.clone(),
            timestamp: Utc::now(),
        });
        self.bus.publish_event(&event).await?;

        debug!(
            session_id = %session.id,
            question_id = %question.id,
            total_votes = results.total_votes,
            "Results refreshed"
        );
        Ok(results)
    }

    /// Snapshot for one question; a cache miss is recomputed and cached
    /// without publishing.
    pub async fn results(&self, session_id: &ObjectId, question_id: &ObjectId) -> PipelineResult<QuestionResult> {
        if let Some(results) = self.cache.cached_results(session_id, question_id).await {
            return Ok(results);
        }

        let session = self.sessions.get_session(session_id).await?;
        let question = session
            .question(question_id)
            .ok_or_else(|| PipelineError::NotFound(format!("question {question_id}")))?;
        self.recompute_and_cache(&session, question).await
    }

    /// One snapshot per question, in question order.
    pub async fn session_results(&self, session_id: &ObjectId) -> PipelineResult<Vec<QuestionResult>> {
        let session = self.sessions.get_session(session_id).await?;
        let mut all = Vec::with_capacity(session.questions.len());
        for question in &session.questions {
            match self.cache.cached_results(&session.id, &question.id).await {
                Some(results) => all.push(results),
                None => all.push(self.recompute_and_cache(&session, question).await?),
            }
        }
        Ok(all)
    }

    async fn recompute_and_cache(&self, session: &Session, question: &Question) -> PipelineResult<QuestionResult> {
        let results = self.compute(session, question).await?;
        if self
            .cache
            .cache_results(&session.id, &question.id, &results)
            .await
            .is_degraded()
        {
            warn!(session_id = %session.id, question_id = %question.id, "Serving uncached results");
        }
        Ok(results)
    }
}
