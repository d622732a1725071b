//! Process-wide lifecycle object owning the store, cache and broker
//! clients. Built once at startup and handed out by typed accessors.

use std::sync::Arc;

use anyhow::Context;
use livepoll_config::{BusBackend, CacheBackend, Settings, StoreBackend};
use tracing::info;

use crate::bus::{Broker, EventBus, MemoryBroker, RedisStreamBroker};
use crate::cache::{CacheAside, KvCache, MemoryCache, RedisCache};
use crate::dao::{SessionDao, VoteDao};
use crate::pipeline::{
    ResultsAggregator, ResultsBroadcaster, RetryPolicy, VoteIngestion, VoteProcessor,
};
use crate::realtime::Hub;
use crate::session::SessionService;
use crate::store::{MemoryStore, SessionStore, VoteStore};

#[derive(Clone)]
pub struct Infrastructure {
    sessions: Arc<dyn SessionStore>,
    votes: Arc<dyn VoteStore>,
    cache: Arc<dyn KvCache>,
    broker: Arc<dyn Broker>,
}

impl Infrastructure {
    /// Connects every backend selected in `settings.backend`.
    pub async fn connect(settings: &Settings) -> anyhow::Result<Self> {
        let (sessions, votes): (Arc<dyn SessionStore>, Arc<dyn VoteStore>) =
            match settings.backend.store {
                StoreBackend::Mongo => {
                    let db = livepoll_db::connect(settings)
                        .await
                        .context("connecting to MongoDB")?;
                    livepoll_db::indexes::ensure_indexes(&db)
                        .await
                        .context("creating indexes")?;
                    let sessions: Arc<dyn SessionStore> = Arc::new(SessionDao::new(&db));
                    let votes: Arc<dyn VoteStore> = Arc::new(VoteDao::new(&db));
                    (sessions, votes)
                }
                StoreBackend::Memory => {
                    let store = Arc::new(MemoryStore::new());
                    let sessions: Arc<dyn SessionStore> = store.clone();
                    let votes: Arc<dyn VoteStore> = store;
                    (sessions, votes)
                }
            };

        let cache: Arc<dyn KvCache> = match settings.backend.cache {
            CacheBackend::Redis => Arc::new(
                RedisCache::connect(&settings.redis.url, settings.timeouts.cache())
                    .await
                    .context("connecting to Redis cache")?,
            ),
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
        };

        let broker: Arc<dyn Broker> = match settings.backend.bus {
            BusBackend::Redis => Arc::new(
                RedisStreamBroker::connect(
                    &settings.redis.url,
                    settings.bus.partitions,
                    settings.bus.stream_max_len,
                )
                .await
                .context("connecting to Redis Streams")?,
            ),
            BusBackend::Memory => Arc::new(
                MemoryBroker::new(settings.bus.partitions).with_max_len(settings.bus.stream_max_len),
            ),
        };

        info!(
            store = ?settings.backend.store,
            cache = ?settings.backend.cache,
            bus = ?settings.backend.bus,
            "Infrastructure ready"
        );
        Ok(Self::from_parts(sessions, votes, cache, broker))
    }

    /// Everything in process memory.
    pub fn in_memory(partitions: u32) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::from_parts(
            store.clone(),
            store,
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryBroker::new(partitions)),
        )
    }

    pub fn from_parts(
        sessions: Arc<dyn SessionStore>,
        votes: Arc<dyn VoteStore>,
        cache: Arc<dyn KvCache>,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            sessions,
            votes,
            cache,
            broker,
        }
    }

    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.sessions)
    }

    pub fn vote_store(&self) -> Arc<dyn VoteStore> {
        Arc::clone(&self.votes)
    }

    pub fn cache(&self) -> Arc<dyn KvCache> {
        Arc::clone(&self.cache)
    }

    pub fn broker(&self) -> Arc<dyn Broker> {
        Arc::clone(&self.broker)
    }

    /// Wires the pipeline components on top of these clients.
    pub fn services(&self, settings: &Settings) -> Services {
        let store_timeout = settings.timeouts.store();
        let bus = EventBus::new(self.broker(), settings.bus.publish_timeout());
        let cache = CacheAside::new(self.cache());
        let sessions = SessionService::new(self.session_store(), cache.clone(), store_timeout);
        let aggregator = ResultsAggregator::new(
            self.vote_store(),
            sessions.clone(),
            cache.clone(),
            bus.clone(),
            store_timeout,
        );
        let retry = RetryPolicy::from_settings(&settings.consumer);
        let processor = VoteProcessor::new(
            sessions.clone(),
            self.vote_store(),
            cache.clone(),
            aggregator.clone(),
            retry.clone(),
            store_timeout,
        );
        let hub = Arc::new(Hub::new(settings.hub.clone()));

        Services {
            ingestion: VoteIngestion::new(bus.clone()),
            broadcaster: ResultsBroadcaster::new(hub.clone(), retry),
            bus,
            cache,
            sessions,
            aggregator,
            processor,
            hub,
        }
    }
}

/// The wired pipeline, ready to be shared by handlers and workers.
#[derive(Clone)]
pub struct Services {
    pub bus: EventBus,
    pub cache: CacheAside,
    pub sessions: SessionService,
    pub ingestion: VoteIngestion,
    pub aggregator: ResultsAggregator,
    pub processor: VoteProcessor,
    pub broadcaster: ResultsBroadcaster,
    pub hub: Arc<Hub>,
}
