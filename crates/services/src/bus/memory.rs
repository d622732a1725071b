use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Broker, BrokerSubscription, BusError, BusMessage, BusResult, partition_for};

/// In-process partitioned log with consumer-group offsets. Each group sees
/// every message of a topic once; members of the same group share the work.
/// New groups start from the oldest retained record. Each partition keeps at
/// most `max_len` records; a group that falls behind the trimmed head resumes
/// at the oldest one still held.
pub struct MemoryBroker {
    partitions: u32,
    max_len: usize,
    topics: DashMap<String, Arc<TopicLog>>,
    closed: Arc<AtomicBool>,
}

struct TopicLog {
    name: String,
    partitions: Vec<Mutex<Partition>>,
    max_len: usize,
    /// group -> next offset per partition
    groups: Mutex<HashMap<String, Vec<usize>>>,
    notify: Notify,
}

/// Retained records of one partition. Offsets are absolute: `base` is the
/// offset of `records[0]`.
#[derive(Default)]
struct Partition {
    base: usize,
    records: VecDeque<BusMessage>,
}

impl Partition {
    fn next_offset(&self) -> usize {
        self.base + self.records.len()
    }
}

impl TopicLog {
    fn new(name: &str, partitions: u32, max_len: usize) -> Self {
        Self {
            name: name.to_string(),
            partitions: (0..partitions).map(|_| Mutex::new(Partition::default())).collect(),
            max_len,
            groups: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    fn append(&self, key: &str, value: Vec<u8>) -> (u32, usize) {
        let partition = partition_for(key, self.partitions.len() as u32);
        let mut log = self.partitions[partition as usize].lock();
        let offset = log.next_offset();
        log.records.push_back(BusMessage {
            topic: self.name.clone(),
            partition,
            offset: offset.to_string(),
            key: key.to_string(),
            value,
            timestamp: Utc::now(),
        });
        while log.records.len() > self.max_len {
            log.records.pop_front();
            log.base += 1;
        }
        drop(log);
        self.notify.notify_waiters();
        (partition, offset)
    }

    fn join_group(&self, group: &str) {
        self.groups
            .lock()
            .entry(group.to_string())
            .or_insert_with(|| vec![0; self.partitions.len()]);
    }

    /// Hands out the next undelivered message for `group`, scanning
    /// partitions round-robin from `start`. Delivery commits the offset.
    fn poll(&self, group: &str, start: &mut usize) -> Option<BusMessage> {
        let mut groups = self.groups.lock();
        let offsets = groups.get_mut(group)?;
        let count = self.partitions.len();
        for step in 0..count {
            let p = (*start + step) % count;
            let log = self.partitions[p].lock();
            let next = offsets[p].max(log.base);
            if next < log.next_offset() {
                let message = log.records[next - log.base].clone();
                offsets[p] = next + 1;
                *start = (p + 1) % count;
                return Some(message);
            }
        }
        None
    }
}

impl MemoryBroker {
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            max_len: usize::MAX,
            topics: DashMap::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Caps every partition at `max_len` records, oldest dropped first.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.max(1);
        self
    }

    /// Simulates losing the broker connection: every later publish and
    /// subscribe call fails with `Unavailable`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for topic in self.topics.iter() {
            topic.notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of records held by one partition of `topic`.
    pub fn partition_len(&self, topic: &str, partition: u32) -> usize {
        self.topics
            .get(topic)
            .and_then(|t| t.partitions.get(partition as usize).map(|p| p.lock().records.len()))
            .unwrap_or(0)
    }

    /// Retained records of `topic` on `partition`, in log order.
    pub fn records(&self, topic: &str, partition: u32) -> Vec<BusMessage> {
        self.topics
            .get(topic)
            .and_then(|t| {
                t.partitions
                    .get(partition as usize)
                    .map(|p| p.lock().records.iter().cloned().collect())
            })
            .unwrap_or_default()
    }

    fn topic(&self, name: &str) -> Arc<TopicLog> {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TopicLog::new(name, self.partitions, self.max_len)))
            .clone()
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.is_closed() {
            Err(BusError::Unavailable("broker connection closed".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> BusResult<()> {
        self.ensure_open()?;
        self.topic(topic).append(key, payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> BusResult<Box<dyn BrokerSubscription>> {
        self.ensure_open()?;
        let log = self.topic(topic);
        log.join_group(group);
        Ok(Box::new(MemorySubscription {
            log,
            group: group.to_string(),
            next_partition: 0,
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct MemorySubscription {
    log: Arc<TopicLog>,
    group: String,
    next_partition: usize,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerSubscription for MemorySubscription {
    async fn next_message(&mut self, max_wait: Duration) -> BusResult<Option<BusMessage>> {
        let deadline = Instant::now() + max_wait;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(BusError::Unavailable("broker connection closed".to_string()));
            }

            let notified = self.log.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.log.poll(&self.group, &mut self.next_partition) {
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.log.poll(&self.group, &mut self.next_partition));
            }
        }
    }
}
