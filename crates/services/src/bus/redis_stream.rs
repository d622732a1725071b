use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamReadOptions, StreamReadReply};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Broker, BrokerSubscription, BusMessage, BusResult, partition_for};

/// Partitioned log on Redis Streams. Partition `p` of topic `t` is the
/// stream `t:p`; consumer groups map to stream consumer groups.
pub struct RedisStreamBroker {
    client: redis::Client,
    conn: ConnectionManager,
    partitions: u32,
    max_len: usize,
}

impl RedisStreamBroker {
    pub async fn connect(url: &str, partitions: u32, max_len: usize) -> BusResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        info!(partitions, "Connected to Redis Streams broker");
        Ok(Self {
            client,
            conn,
            partitions: partitions.max(1),
            max_len,
        })
    }

    fn stream_key(topic: &str, partition: u32) -> String {
        format!("{topic}:{partition}")
    }
}

#[async_trait]
impl Broker for RedisStreamBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> BusResult<()> {
        let partition = partition_for(key, self.partitions);
        let stream = Self::stream_key(topic, partition);
        let mut conn = self.conn.clone();

        let id: String = redis::cmd("XADD")
            .arg(&stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*")
            .arg("key")
            .arg(key)
            .arg("value")
            .arg(payload)
            .arg("ts")
            .arg(Utc::now().timestamp_millis())
            .query_async(&mut conn)
            .await?;

        debug!(stream = %stream, id = %id, "Appended record");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> BusResult<Box<dyn BrokerSubscription>> {
        // Blocking reads get their own connection so they never stall
        // publishers sharing the manager.
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let streams: Vec<String> = (0..self.partitions)
            .map(|p| Self::stream_key(topic, p))
            .collect();

        for stream in &streams {
            let created: redis::RedisResult<()> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(stream)
                .arg(group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;
            match created {
                Ok(()) => debug!(stream = %stream, group, "Created consumer group"),
                Err(e) if e.code() == Some("BUSYGROUP") => {}
                Err(e) => return Err(e.into()),
            }
        }

        let consumer = format!("{group}-{}", Uuid::new_v4());
        info!(topic, group, consumer = %consumer, "Subscribed to stream group");

        Ok(Box::new(StreamSubscription {
            conn,
            topic: topic.to_string(),
            group: group.to_string(),
            consumer,
            streams,
            buffered: VecDeque::new(),
        }))
    }
}

struct StreamSubscription {
    conn: MultiplexedConnection,
    topic: String,
    group: String,
    consumer: String,
    streams: Vec<String>,
    buffered: VecDeque<BusMessage>,
}

impl StreamSubscription {
    async fn read_batch(&mut self, max_wait: Duration) -> BusResult<()> {
        let block_ms = max_wait.as_millis().clamp(1, usize::MAX as u128) as usize;
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
            .block(block_ms);
        let ids: Vec<&str> = self.streams.iter().map(|_| ">").collect();

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&self.streams, &ids, &opts)
            .await?;
        let Some(reply) = reply else {
            return Ok(());
        };

        for stream in reply.keys {
            let partition = self
                .streams
                .iter()
                .position(|s| s == &stream.key)
                .unwrap_or_default() as u32;

            for entry in stream.ids {
                // Offsets are committed on delivery.
                let acked: i64 = self
                    .conn
                    .xack(&stream.key, &self.group, &[&entry.id])
                    .await?;
                if acked == 0 {
                    warn!(stream = %stream.key, id = %entry.id, "Record was already acknowledged");
                }

                let Some(value) = entry.get::<Vec<u8>>("value") else {
                    warn!(stream = %stream.key, id = %entry.id, "Dropping record without value");
                    continue;
                };
                let timestamp = entry
                    .get::<i64>("ts")
                    .and_then(DateTime::from_timestamp_millis)
                    .unwrap_or_else(Utc::now);

                self.buffered.push_back(BusMessage {
                    topic: self.topic.clone(),
                    partition,
                    offset: entry.id.clone(),
                    key: entry.get::<String>("key").unwrap_or_default(),
                    value,
                    timestamp,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerSubscription for StreamSubscription {
    async fn next_message(&mut self, max_wait: Duration) -> BusResult<Option<BusMessage>> {
        if self.buffered.is_empty() {
            self.read_batch(max_wait).await?;
        }
        Ok(self.buffered.pop_front())
    }
}
