//! The asynchronous vote path: ingestion publishes, the processor
//! deduplicates and persists, the aggregator recomputes results and the
//! broadcaster pushes them to live connections.

pub mod aggregator;
pub mod broadcaster;
pub mod error;
pub mod ingestion;
pub mod processor;
pub mod retry;

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{BusResult, EventBus, groups, topics};

pub use aggregator::ResultsAggregator;
pub use broadcaster::{ResultsBroadcaster, ResultsEnvelope};
pub use error::{PipelineError, PipelineResult};
pub use ingestion::{SubmitMeta, VoteAccepted, VoteIngestion, VoteRequest};
pub use processor::{MessageOutcome, VoteProcessor};
pub use retry::RetryPolicy;

/// Subscribes both consumer groups and starts their pull loops. Subscribing
/// happens before spawning so a broker failure surfaces at startup.
pub async fn spawn_workers(
    bus: &EventBus,
    processor: VoteProcessor,
    broadcaster: ResultsBroadcaster,
    max_wait: Duration,
    shutdown: watch::Receiver<bool>,
) -> BusResult<Vec<JoinHandle<()>>> {
    let votes = bus
        .subscribe(topics::VOTES_SUBMITTED, groups::VOTE_PROCESSOR)
        .await?;
    let results = bus
        .subscribe(topics::RESULTS_UPDATED, groups::RESULTS_BROADCASTER)
        .await?;

    Ok(vec![
        tokio::spawn(processor.run(votes, max_wait, shutdown.clone())),
        tokio::spawn(broadcaster.run(results, max_wait, shutdown)),
    ])
}
