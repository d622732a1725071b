pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, patch, post},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.app.cors_origins);

    let session_routes = Router::new()
        .route("/", post(routes::sessions::create))
        .route("/join/{code}", get(routes::sessions::get_by_join_code))
        .route("/{session_id}", get(routes::sessions::get))
        .route("/{session_id}/status", patch(routes::sessions::update_status))
        .route("/{session_id}/results", get(routes::results::session_results))
        .route(
            "/{session_id}/results/{question_id}",
            get(routes::results::question_results),
        );

    let organizer_routes = Router::new()
        .route("/{organizer_id}/sessions", get(routes::sessions::list_by_organizer));

    let api = Router::new()
        .nest("/sessions", session_routes)
        .nest("/organizers", organizer_routes)
        .route("/votes", post(routes::votes::submit))
        .route("/ws/stats", get(routes::stats::session_stats));

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api/v1", api)
        .merge(health)
        .route("/ws", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Any origin when none are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(allowed)
    }
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
