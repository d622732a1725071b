use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bson::{DateTime, oid::ObjectId};
use livepoll_db::models::{Question, QuestionType, Vote};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::aggregator::ResultsAggregator;
use super::error::{PipelineError, PipelineResult};
use super::retry::RetryPolicy;
use crate::bus::{BusMessage, EventSubscription, PollEvent, VoteSubmittedEvent};
use crate::cache::CacheAside;
use crate::dao::base::{DaoError, bounded};
use crate::session::SessionService;
use crate::store::VoteStore;

/// What happened to one bus message.
#[derive(Debug)]
pub enum MessageOutcome {
    Processed(Vote),
    /// Final failure: non-retriable, or retries exhausted.
    Rejected(PipelineError),
    /// Payload could not be decoded; never retried.
    Dropped(String),
}

/// Consumes vote-submitted events: validate against the session,
/// deduplicate, persist, then trigger aggregation.
#[derive(Clone)]
pub struct VoteProcessor {
    sessions: SessionService,
    votes: Arc<dyn VoteStore>,
    cache: CacheAside,
    aggregator: ResultsAggregator,
    retry: RetryPolicy,
    store_timeout: Duration,
}

impl VoteProcessor {
    pub fn new(
        sessions: SessionService,
        votes: Arc<dyn VoteStore>,
        cache: CacheAside,
        aggregator: ResultsAggregator,
        retry: RetryPolicy,
        store_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            votes,
            cache,
            aggregator,
            retry,
            store_timeout,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// One attempt at accepting the vote carried by `event`.
    pub async fn process(&self, event: &VoteSubmittedEvent) -> PipelineResult<Vote> {
        let vote_id = parse_id("voteId", &event.vote_id)?;
        let session_id = parse_id("sessionId", &event.session_id)?;
        let question_id = parse_id("questionId", &event.question_id)?;
        if event.participant_id.trim().is_empty() {
            return Err(PipelineError::MalformedInput("participantId is required".to_string()));
        }

        let session = self.sessions.get_session(&session_id).await?;
        if !session.is_active() {
            return Err(PipelineError::Inactive(format!(
                "session {session_id} is {}",
                session.status.as_str()
            )));
        }
        let question = session
            .question(&question_id)
            .ok_or_else(|| PipelineError::NotFound(format!("question {question_id}")))?;
        validate_selection(question, &event.selected_options)?;

        let participant = event.participant_id.as_str();
        if !self
            .cache
            .acquire_vote_lock(&session_id, &question_id, participant)
            .await?
        {
            return Err(PipelineError::Conflict);
        }

        let now = DateTime::now();
        let vote = Vote {
            id: vote_id,
            session_id,
            question_id,
            participant_id: participant.to_string(),
            selected_options: event.selected_options.clone(),
            created_at: DateTime::from_chrono(event.timestamp),
            processed: true,
            processed_at: Some(now),
        };

        match bounded(self.store_timeout, "insert vote", self.votes.insert(&vote)).await {
            Ok(()) => {}
            Err(DaoError::DuplicateKey(key)) => match self.stored_earlier(&vote).await {
                Ok(true) => debug!(vote_id = %vote.id, "Vote was stored by an earlier attempt"),
                Ok(false) => {
                    debug!(%key, "Vote rejected by unique index");
                    return Err(PipelineError::Conflict);
                }
                Err(e) => {
                    self.release_lock(&vote).await;
                    return Err(e.into());
                }
            },
            Err(e) => {
                // The retry must not trip over our own lock.
                self.release_lock(&vote).await;
                return Err(e.into());
            }
        }

        let _ = self.cache.cache_vote(&vote).await;
        info!(
            vote_id = %vote.id,
            %session_id,
            %question_id,
            "Vote persisted"
        );

        if let Err(e) = self.aggregator.refresh(&session, question).await {
            warn!(%session_id, %question_id, %e, "Results refresh failed after vote was stored");
        }

        Ok(vote)
    }

    /// Runs [`process`](Self::process) until it succeeds, fails for good, or
    /// the retry budget is spent.
    pub async fn process_with_retry(&self, event: &VoteSubmittedEvent) -> PipelineResult<Vote> {
        let mut attempt = 0;
        loop {
            match self.process(event).await {
                Ok(vote) => return Ok(vote),
                Err(e) if e.is_retriable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.jittered_delay(attempt);
                    warn!(
                        vote_id = %event.vote_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        %e,
                        "Retrying vote"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn handle_message(&self, message: &BusMessage) -> MessageOutcome {
        let event = match message.decode::<PollEvent>() {
            Ok(PollEvent::VoteSubmitted(event)) => event,
            Ok(other) => {
                warn!(topic = %message.topic, kind = other.topic(), "Unexpected event on vote topic");
                return MessageOutcome::Dropped("unexpected event type".to_string());
            }
            Err(e) => {
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = %message.offset,
                    %e,
                    "Dropping undecodable vote event"
                );
                return MessageOutcome::Dropped(e.to_string());
            }
        };

        match self.process_with_retry(&event).await {
            Ok(vote) => MessageOutcome::Processed(vote),
            Err(e) => {
                match &e {
                    PipelineError::Conflict => {
                        info!(vote_id = %event.vote_id, participant_id = %event.participant_id, "Duplicate vote rejected")
                    }
                    PipelineError::Unavailable(_) => {
                        error!(vote_id = %event.vote_id, %e, "Vote failed after retries")
                    }
                    _ => warn!(vote_id = %event.vote_id, %e, "Vote rejected"),
                }
                MessageOutcome::Rejected(e)
            }
        }
    }

    /// Pull loop. Returns once `shutdown` flips to `true` or its sender is
    /// dropped.
    pub async fn run(
        self,
        mut subscription: EventSubscription,
        max_wait: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(topic = subscription.topic(), group = subscription.group(), "Vote processor started");
        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                next = subscription.next(max_wait) => match next {
                    Ok(Some(message)) => {
                        self.handle_message(&message).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(%e, "Vote subscription failed");
                        tokio::time::sleep(self.retry.delay(0)).await;
                    }
                },
            }
        }
        info!("Vote processor stopped");
    }
}

impl VoteProcessor {
    /// Whether the document holding the unique slot is this event's own vote,
    /// written by an attempt whose acknowledgment was lost.
    async fn stored_earlier(&self, vote: &Vote) -> Result<bool, DaoError> {
        match bounded(self.store_timeout, "find vote", self.votes.find_by_id(vote.id)).await {
            Ok(stored) => Ok(stored.session_id == vote.session_id
                && stored.question_id == vote.question_id
                && stored.participant_id == vote.participant_id),
            Err(DaoError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn release_lock(&self, vote: &Vote) {
        let _ = self
            .cache
            .release_vote_lock(&vote.session_id, &vote.question_id, &vote.participant_id)
            .await;
    }
}

fn parse_id(field: &str, value: &str) -> PipelineResult<ObjectId> {
    ObjectId::parse_str(value)
        .map_err(|_| PipelineError::MalformedInput(format!("{field} is not a valid id")))
}

/// Selected indices must be distinct and in range; single-choice questions
/// take exactly one.
pub fn validate_selection(question: &Question, selected: &[i32]) -> PipelineResult<()> {
    if selected.is_empty() {
        return Err(PipelineError::MalformedInput("no option selected".to_string()));
    }
    let len = question.options.len();
    if let Some(bad) = selected.iter().find(|&&i| i < 0 || i as usize >= len) {
        return Err(PipelineError::MalformedInput(format!(
            "option {bad} is out of range for {len} options"
        )));
    }
    let distinct: HashSet<i32> = selected.iter().copied().collect();
    if distinct.len() != selected.len() {
        return Err(PipelineError::MalformedInput("duplicate option selected".to_string()));
    }
    if question.question_type == QuestionType::Single && selected.len() != 1 {
        return Err(PipelineError::MalformedInput(
            "single choice question takes exactly one option".to_string(),
        ));
    }
    Ok(())
}
