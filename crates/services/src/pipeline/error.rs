use thiserror::Error;

use crate::bus::BusError;
use crate::cache::CacheError;
use crate::dao::base::DaoError;

/// Failure taxonomy shared by ingestion, processing and the session service.
/// Only `Unavailable` is worth retrying; everything else is final for the
/// message that caused it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Session is not active: {0}")]
    Inactive(String),
    #[error("Vote already recorded")]
    Conflict,
    #[error("Dependency unavailable: {0}")]
    Unavailable(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, PipelineError::Unavailable(_))
    }
}

impl From<DaoError> for PipelineError {
    fn from(err: DaoError) -> Self {
        match err {
            DaoError::NotFound => PipelineError::NotFound("entity".to_string()),
            DaoError::DuplicateKey(_) => PipelineError::Conflict,
            DaoError::Validation(msg) => PipelineError::MalformedInput(msg),
            other => PipelineError::Unavailable(other.to_string()),
        }
    }
}

impl From<CacheError> for PipelineError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Payload(e) => PipelineError::MalformedInput(e.to_string()),
            other => PipelineError::Unavailable(other.to_string()),
        }
    }
}

impl From<BusError> for PipelineError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Encode(e) => PipelineError::MalformedInput(e.to_string()),
            other => PipelineError::Unavailable(other.to_string()),
        }
    }
}
