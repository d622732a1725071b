use std::net::SocketAddr;
use std::sync::Arc;

use livepoll_api::{build_router, state::AppState};
use livepoll_config::Settings;
use livepoll_services::bus::MemoryBroker;
use livepoll_services::cache::MemoryCache;
use livepoll_services::store::MemoryStore;
use livepoll_services::{Infrastructure, Services, pipeline};
use tokio::net::TcpListener;
use tokio::sync::watch;

use super::test_settings;

/// A running test application on in-memory backends, with the vote
/// processor and results broadcaster started.
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub settings: Settings,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub broker: Arc<MemoryBroker>,
    pub services: Services,
    pub client: reqwest::Client,
    _shutdown: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(|_| {}).await
    }

    /// The `mutator` closure receives the settings after test defaults are
    /// applied.
    pub async fn spawn_with_settings(mutator: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = test_settings();
        mutator(&mut settings);

        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let broker = Arc::new(
            MemoryBroker::new(settings.bus.partitions).with_max_len(settings.bus.stream_max_len),
        );
        let infra =
            Infrastructure::from_parts(store.clone(), store.clone(), cache.clone(), broker.clone());

        let app_state = AppState::new(&infra, settings.clone());
        let services = app_state.services.clone();

        let (shutdown, shutdown_rx) = watch::channel(false);
        pipeline::spawn_workers(
            &services.bus,
            services.processor.clone(),
            services.broadcaster.clone(),
            settings.bus.max_wait(),
            shutdown_rx,
        )
        .await
        .expect("Failed to start pipeline workers");

        let app = build_router(app_state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base_url = format!("http://{}", addr);
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self {
            addr,
            base_url,
            settings,
            store,
            cache,
            broker,
            services,
            client,
            _shutdown: shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn ws_url(&self, session_id: &str, user_type: &str, user_id: &str) -> String {
        format!(
            "ws://{}/ws?sessionId={session_id}&userType={user_type}&userId={user_id}",
            self.addr
        )
    }
}
