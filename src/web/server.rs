use axum::{routing::get, routing::post, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::reconciler::spawn_sweeper;

use super::api::channels as channel_handlers;
use super::api::stream as stream_handlers;
use super::api::tracks as track_handlers;
use super::api_doc::ApiDoc;
use super::auth::AppState;
use super::config::Config;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Live channels
        .route("/api/channels", get(channel_handlers::list_channels))
        .route("/api/channels/{id}", get(channel_handlers::get_channel))
        .route(
            "/api/channels/{id}/positions",
            post(channel_handlers::publish_position),
        )
        // Tracks and playback
        .route("/api/tracks/{id}", get(track_handlers::get_track))
        .route("/api/tracks/{id}/load", post(track_handlers::load_track))
        .route(
            "/api/tracks/{id}/samples/{index}",
            get(track_handlers::get_sample),
        )
        .route("/api/tracks/{id}/scrub", get(track_handlers::scrub))
        .route(
            "/api/tracks/{id}/interpolate",
            get(track_handlers::interpolate),
        )
        // Render events
        .route("/api/stream", get(stream_handlers::stream_events))
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: Config) -> std::io::Result<()> {
    let bind_addr = config.web.bind.clone();
    let sweep_interval = config.live.sweep_interval;
    if !config.auth_enabled() {
        log::warn!("No API keys configured, write endpoints are open");
    }

    let state = AppState::new(config);
    let sweeper = spawn_sweeper(state.reconciler.clone(), sweep_interval);
    let app = router(state);

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let result = axum::serve(listener, app).await;
    sweeper.abort();
    result
}
