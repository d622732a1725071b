use std::sync::Arc;
use std::time::Duration;

use bson::{DateTime, oid::ObjectId};
use livepoll_db::models::{Question, QuestionType, Session, SessionStatus};
use rand::RngCore;
use tracing::{debug, info, warn};

use crate::cache::CacheAside;
use crate::dao::base::{DaoError, bounded};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::store::SessionStore;

const JOIN_CODE_ATTEMPTS: usize = 5;

/// Input for a new session. `join_code` exists only so a client-supplied
/// value can be rejected; codes are always generated here.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub organizer_id: ObjectId,
    pub title: String,
    pub join_code: Option<String>,
    pub questions: Vec<NewQuestion>,
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub text: String,
    pub options: Vec<String>,
    pub question_type: QuestionType,
}

/// Cache-aside access to sessions. The store is authoritative; every cache
/// failure degrades to a store read.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    cache: CacheAside,
    store_timeout: Duration,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, cache: CacheAside, store_timeout: Duration) -> Self {
        Self {
            store,
            cache,
            store_timeout,
        }
    }

    pub async fn create_session(&self, input: NewSession) -> PipelineResult<Session> {
        if input.join_code.as_deref().is_some_and(|c| !c.is_empty()) {
            return Err(PipelineError::MalformedInput(
                "join code is generated by the server and must not be supplied".to_string(),
            ));
        }
        validate_new_session(&input)?;

        let now = DateTime::now();
        let questions: Vec<Question> = input
            .questions
            .into_iter()
            .map(|q| Question {
                id: ObjectId::new(),
                text: q.text.trim().to_string(),
                options: q.options,
                question_type: q.question_type,
            })
            .collect();

        let mut session = Session {
            id: ObjectId::new(),
            organizer_id: input.organizer_id,
            title: input.title.trim().to_string(),
            join_code: generate_join_code(),
            status: SessionStatus::Draft,
            questions,
            created_at: now,
            updated_at: now,
        };

        let mut attempt = 1;
        loop {
            match bounded(self.store_timeout, "insert session", self.store.insert(&session)).await {
                Ok(()) => break,
                Err(DaoError::DuplicateKey(key)) if attempt < JOIN_CODE_ATTEMPTS => {
                    debug!(%key, attempt, "Join code collision, regenerating");
                    session.join_code = generate_join_code();
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let _ = self.cache.cache_session(&session).await;
        self.index_new_session(&session).await;
        info!(session_id = %session.id, join_code = %session.join_code, "Session created");
        Ok(session)
    }

    /// A live organizer index gets the new member. A missing one is rebuilt
    /// from the store so it never holds a partial listing.
    async fn index_new_session(&self, session: &Session) {
        let organizer_id = session.organizer_id;
        if !self.cache.organizer_session_ids(&organizer_id).await.is_empty() {
            let _ = self
                .cache
                .index_organizer_sessions(&organizer_id, std::slice::from_ref(session))
                .await;
            return;
        }

        match bounded(
            self.store_timeout,
            "list sessions",
            self.store.list_by_organizer(organizer_id),
        )
        .await
        {
            Ok(sessions) => {
                let _ = self.cache.index_organizer_sessions(&organizer_id, &sessions).await;
            }
            Err(e) => warn!(%organizer_id, %e, "Organizer index left cold"),
        }
    }

    /// Cache first, then the store; a store hit repopulates the cache.
    pub async fn get_session(&self, session_id: &ObjectId) -> PipelineResult<Session> {
        if let Some(session) = self.cache.cached_session(session_id).await {
            return Ok(session);
        }

        let session = bounded(
            self.store_timeout,
            "find session",
            self.store.find_by_id(*session_id),
        )
        .await
        .map_err(|e| match e {
            DaoError::NotFound => PipelineError::NotFound(format!("session {session_id}")),
            other => other.into(),
        })?;

        let _ = self.cache.cache_session(&session).await;
        Ok(session)
    }

    pub async fn find_by_join_code(&self, join_code: &str) -> PipelineResult<Session> {
        if let Some(session_id) = self.cache.session_id_for_join_code(join_code).await {
            match self.get_session(&session_id).await {
                Ok(session) if session.join_code == join_code => return Ok(session),
                Ok(_) | Err(PipelineError::NotFound(_)) => {
                    warn!(join_code, "Stale join code mapping, reading store");
                }
                Err(e) => return Err(e),
            }
        }

        let session = bounded(
            self.store_timeout,
            "find session by join code",
            self.store.find_by_join_code(join_code),
        )
        .await
        .map_err(|e| match e {
            DaoError::NotFound => PipelineError::NotFound(format!("join code {join_code}")),
            other => other.into(),
        })?;

        let _ = self.cache.cache_session(&session).await;
        Ok(session)
    }

    /// Newest first.
    pub async fn list_by_organizer(&self, organizer_id: &ObjectId) -> PipelineResult<Vec<Session>> {
        let ids = self.cache.organizer_session_ids(organizer_id).await;
        if !ids.is_empty() {
            let mut sessions = Vec::with_capacity(ids.len());
            for id in ids {
                match self.get_session(&id).await {
                    Ok(session) => sessions.push(session),
                    Err(PipelineError::NotFound(_)) => {
                        debug!(session_id = %id, "Skipping vanished session");
                    }
                    Err(e) => return Err(e),
                }
            }
            return Ok(sessions);
        }

        let sessions = bounded(
            self.store_timeout,
            "list sessions",
            self.store.list_by_organizer(*organizer_id),
        )
        .await?;

        for session in &sessions {
            let _ = self.cache.cache_session(session).await;
        }
        let _ = self.cache.index_organizer_sessions(organizer_id, &sessions).await;
        Ok(sessions)
    }

    /// Writes the store first, then drops the cached copy so the next read
    /// sees the new status.
    pub async fn update_status(
        &self,
        session_id: &ObjectId,
        status: SessionStatus,
    ) -> PipelineResult<Session> {
        let matched = bounded(
            self.store_timeout,
            "update session status",
            self.store.update_status(*session_id, status),
        )
        .await?;
        if !matched {
            return Err(PipelineError::NotFound(format!("session {session_id}")));
        }

        let _ = self.cache.invalidate_session(session_id).await;
        info!(%session_id, status = status.as_str(), "Session status updated");
        self.get_session(session_id).await
    }
}

/// Six lowercase hex characters.
pub fn generate_join_code() -> String {
    let mut bytes = [0u8; 3];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn validate_new_session(input: &NewSession) -> PipelineResult<()> {
    if input.title.trim().is_empty() {
        return Err(PipelineError::MalformedInput("title is required".to_string()));
    }
    if input.questions.is_empty() {
        return Err(PipelineError::MalformedInput(
            "at least one question is required".to_string(),
        ));
    }
    for (i, question) in input.questions.iter().enumerate() {
        if question.text.trim().is_empty() {
            return Err(PipelineError::MalformedInput(format!(
                "question {i} has no text"
            )));
        }
        if question.options.len() < 2 {
            return Err(PipelineError::MalformedInput(format!(
                "question {i} needs at least two options"
            )));
        }
        if question.options.iter().any(|o| o.trim().is_empty()) {
            return Err(PipelineError::MalformedInput(format!(
                "question {i} has an empty option"
            )));
        }
    }
    Ok(())
}
