use std::sync::Arc;

use livepoll_config::Settings;
use livepoll_services::bus::MemoryBroker;
use livepoll_services::cache::{KvCache, MemoryCache};
use livepoll_services::store::{MemoryStore, VoteStore};
use livepoll_services::{Infrastructure, Services};

use super::test_settings;

/// The wired pipeline over in-memory backends, without the HTTP layer.
pub struct Harness {
    pub settings: Settings,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub broker: Arc<MemoryBroker>,
    pub infra: Infrastructure,
    pub services: Services,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(test_settings(), None, None)
    }

    pub fn with_settings(mutator: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = test_settings();
        mutator(&mut settings);
        Self::build(settings, None, None)
    }

    /// Sessions stay in `store`; votes go to `votes`.
    pub fn with_vote_store(votes: Arc<dyn VoteStore>, store: Arc<MemoryStore>) -> Self {
        Self::build_with_store(test_settings(), store, Some(votes), None)
    }

    pub fn with_cache(cache: Arc<dyn KvCache>) -> Self {
        Self::build(test_settings(), None, Some(cache))
    }

    fn build(
        settings: Settings,
        votes: Option<Arc<dyn VoteStore>>,
        cache: Option<Arc<dyn KvCache>>,
    ) -> Self {
        Self::build_with_store(settings, Arc::new(MemoryStore::new()), votes, cache)
    }

    fn build_with_store(
        settings: Settings,
        store: Arc<MemoryStore>,
        votes: Option<Arc<dyn VoteStore>>,
        cache: Option<Arc<dyn KvCache>>,
    ) -> Self {
        let memory_cache = Arc::new(MemoryCache::new());
        let broker = Arc::new(
            MemoryBroker::new(settings.bus.partitions).with_max_len(settings.bus.stream_max_len),
        );

        let votes = votes.unwrap_or_else(|| store.clone() as Arc<dyn VoteStore>);
        let cache = cache.unwrap_or_else(|| memory_cache.clone() as Arc<dyn KvCache>);
        let infra = Infrastructure::from_parts(store.clone(), votes, cache, broker.clone());
        let services = infra.services(&settings);

        Self {
            settings,
            store,
            cache: memory_cache,
            broker,
            infra,
            services,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
