use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;

use super::{CacheError, CacheResult, KvCache};

enum Value {
    Text(String),
    Set(BTreeSet<String>),
    Sorted(Vec<(f64, String)>),
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-process stand-in for Redis with lazy TTL expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.is_live())
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.expires_at.saturating_duration_since(Instant::now()))
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn wrong_type(key: &str) -> CacheError {
        CacheError::Unavailable(format!("WRONGTYPE operation against key {key}"))
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self.entries.get(key) {
            Some(entry) if entry.is_live() => match &entry.value {
                Value::Text(text) => Ok(Some(text.clone())),
                _ => Err(Self::wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), Entry::new(Value::Text(value.to_string()), ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_live() {
                    return Ok(false);
                }
                occupied.insert(Entry::new(Value::Text(value.to_string()), ttl));
                Ok(true)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(Value::Text(value.to_string()), ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> CacheResult<()> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Set(BTreeSet::new()), ttl));
        if !entry.is_live() {
            *entry = Entry::new(Value::Set(BTreeSet::new()), ttl);
        }
        match &mut entry.value {
            Value::Set(members) => {
                members.insert(member.to_string());
            }
            _ => return Err(Self::wrong_type(key)),
        }
        entry.expires_at = Instant::now() + ttl;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        match self.entries.get(key) {
            Some(entry) if entry.is_live() => match &entry.value {
                Value::Set(members) => Ok(members.iter().cloned().collect()),
                _ => Err(Self::wrong_type(key)),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn sorted_add(&self, key: &str, member: &str, score: f64, ttl: Duration) -> CacheResult<()> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Sorted(Vec::new()), ttl));
        if !entry.is_live() {
            *entry = Entry::new(Value::Sorted(Vec::new()), ttl);
        }
        match &mut entry.value {
            Value::Sorted(members) => {
                members.retain(|(_, m)| m != member);
                members.push((score, member.to_string()));
                members.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            }
            _ => return Err(Self::wrong_type(key)),
        }
        entry.expires_at = Instant::now() + ttl;
        Ok(())
    }

    async fn sorted_members_desc(&self, key: &str) -> CacheResult<Vec<String>> {
        match self.entries.get(key) {
            Some(entry) if entry.is_live() => match &entry.value {
                Value::Sorted(members) => {
                    Ok(members.iter().rev().map(|(_, m)| m.clone()).collect())
                }
                _ => Err(Self::wrong_type(key)),
            },
            _ => Ok(Vec::new()),
        }
    }
}
