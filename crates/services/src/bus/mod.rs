//! Publish/subscribe over a partitioned, log-based broker.
//!
//! All events for one poll session are published with the session id as the
//! partition key, so they land on one partition and keep their relative
//! order. Offsets are committed as soon as a message is handed to a
//! subscriber, which means a crash can redeliver; consumers are idempotent.

pub mod events;
pub mod memory;
pub mod redis_stream;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;

pub use events::{PollEvent, ResultsUpdatedEvent, VoteSubmittedEvent};
pub use memory::MemoryBroker;
pub use redis_stream::RedisStreamBroker;

pub mod topics {
    pub const VOTES_SUBMITTED: &str = "votes.submitted";
    pub const RESULTS_UPDATED: &str = "votes.updated";
}

pub mod groups {
    pub const VOTE_PROCESSOR: &str = "vote-processor-group";
    pub const RESULTS_BROADCASTER: &str = "results-broadcaster-group";
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Event bus unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Broker error: {0}")]
    Broker(String),
}

impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            BusError::Unavailable(err.to_string())
        } else {
            BusError::Broker(err.to_string())
        }
    }
}

pub type BusResult<T> = Result<T, BusError>;

/// A record read back from the log.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub partition: u32,
    /// Broker-assigned position within the partition.
    pub offset: String,
    pub key: String,
    pub value: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl BusMessage {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.value)
    }
}

/// Raw broker client: bytes in, bytes out.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> BusResult<()>;

    async fn subscribe(&self, topic: &str, group: &str) -> BusResult<Box<dyn BrokerSubscription>>;
}

/// Blocking pull interface over one topic for one consumer group.
#[async_trait]
pub trait BrokerSubscription: Send {
    /// Waits at most `max_wait` for the next message; `Ok(None)` means the
    /// interval passed without one.
    async fn next_message(&mut self, max_wait: Duration) -> BusResult<Option<BusMessage>>;
}

/// Picks the partition for `key` (FNV-1a, stable across processes).
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash % partitions.max(1)
}

/// Typed client the pipeline talks to.
#[derive(Clone)]
pub struct EventBus {
    broker: Arc<dyn Broker>,
    publish_timeout: Duration,
}

impl EventBus {
    pub fn new(broker: Arc<dyn Broker>, publish_timeout: Duration) -> Self {
        Self {
            broker,
            publish_timeout,
        }
    }

    /// Serializes `payload` as JSON and appends it to `topic`.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        partition_key: &str,
        payload: &T,
    ) -> BusResult<()> {
        let bytes = serde_json::to_vec(payload)?;
        match tokio::time::timeout(
            self.publish_timeout,
            self.broker.publish(topic, partition_key, bytes),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(BusError::Unavailable(format!(
                    "publish to {topic} timed out after {}ms",
                    self.publish_timeout.as_millis()
                )));
            }
        }
        debug!(topic, key = partition_key, "Produced message");
        Ok(())
    }

    /// Publishes a pipeline event on its topic, keyed by its session.
    pub async fn publish_event(&self, event: &PollEvent) -> BusResult<()> {
        self.publish(event.topic(), event.session_id(), event).await
    }

    pub async fn subscribe(&self, topic: &str, group: &str) -> BusResult<EventSubscription> {
        let inner = self.broker.subscribe(topic, group).await?;
        Ok(EventSubscription {
            topic: topic.to_string(),
            group: group.to_string(),
            inner,
        })
    }
}

pub struct EventSubscription {
    topic: String,
    group: String,
    inner: Box<dyn BrokerSubscription>,
}

impl EventSubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub async fn next(&mut self, max_wait: Duration) -> BusResult<Option<BusMessage>> {
        self.inner.next_message(max_wait).await
    }
}
