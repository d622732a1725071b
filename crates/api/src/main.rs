use livepoll_api::{build_router, state::AppState};
use livepoll_config::Settings;
use livepoll_services::{Infrastructure, pipeline};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (silently ignore if missing)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "livepoll_api=debug,livepoll_services=debug,livepoll_db=debug,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config
    let settings = Settings::load()?;
    info!("Starting LivePoll API on {}:{}", settings.app.host, settings.app.port);

    // Connect store, cache and broker
    let infra = Infrastructure::connect(&settings).await?;
    let app_state = AppState::new(&infra, settings.clone());

    // Background consumers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = pipeline::spawn_workers(
        &app_state.services.bus,
        app_state.services.processor.clone(),
        app_state.services.broadcaster.clone(),
        settings.bus.max_wait(),
        shutdown_rx,
    )
    .await?;

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(%e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    for worker in workers {
        let _ = worker.await;
    }
    info!("Stopped");

    Ok(())
}
