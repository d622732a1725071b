use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub backend: BackendSettings,
    pub bus: BusSettings,
    pub consumer: ConsumerSettings,
    pub hub: HubSettings,
    pub timeouts: TimeoutSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
}

/// Which implementation backs each external collaborator.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub store: StoreBackend,
    pub cache: CacheBackend,
    pub bus: BusBackend,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BusBackend {
    Redis,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusSettings {
    pub partitions: u32,
    pub max_wait_ms: u64,
    pub publish_timeout_ms: u64,
    pub stream_max_len: usize,
}

impl BusSettings {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// Retry budget of the vote consumer.
#[derive(Debug, Deserialize, Clone)]
pub struct ConsumerSettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    pub client_queue_capacity: usize,
    pub session_mailbox: usize,
    pub max_frame_bytes: usize,
    pub ping_interval_secs: u64,
    pub read_deadline_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            client_queue_capacity: 256,
            session_mailbox: 256,
            max_frame_bytes: 512,
            ping_interval_secs: 30,
            read_deadline_secs: 60,
            write_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutSettings {
    pub store_ms: u64,
    pub cache_ms: u64,
}

impl TimeoutSettings {
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn cache(&self) -> Duration {
        Duration::from_millis(self.cache_ms)
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("LIVEPOLL"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 8080)?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("database.url", "mongodb://localhost:27017")?
            .set_default("database.name", "polling")?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("backend.store", "mongo")?
            .set_default("backend.cache", "redis")?
            .set_default("backend.bus", "redis")?
            .set_default("bus.partitions", 3)?
            .set_default("bus.max_wait_ms", 1000)?
            .set_default("bus.publish_timeout_ms", 5000)?
            .set_default("bus.stream_max_len", 100_000)?
            .set_default("consumer.max_retries", 3)?
            .set_default("consumer.base_delay_ms", 1000)?
            .set_default("consumer.max_delay_ms", 30_000)?
            .set_default("consumer.jitter", 0.2)?
            .set_default("hub.client_queue_capacity", 256)?
            .set_default("hub.session_mailbox", 256)?
            .set_default("hub.max_frame_bytes", 512)?
            .set_default("hub.ping_interval_secs", 30)?
            .set_default("hub.read_deadline_secs", 60)?
            .set_default("hub.write_timeout_secs", 10)?
            .set_default("timeouts.store_ms", 10_000)?
            .set_default("timeouts.cache_ms", 5000)?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::load().expect("Failed to load default settings")
    }
}
