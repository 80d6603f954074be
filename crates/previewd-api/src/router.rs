//! Route definitions for the Previewd HTTP API.
//!
//! All routes are mounted under `/api`. The router receives `AppState`
//! and passes it to all handlers via Axum's `State` extractor.

use axum::http::HeaderValue;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(preview_routes())
        .merge(health_routes());

    let cors = build_cors_layer(&state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Derivative endpoints: sync fetch, async warm-up, job status, model blobs.
fn preview_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/preview/thumb/{user}/{*path}",
            get(handlers::preview::thumbnail),
        )
        .route(
            "/preview/image/{user}/{*path}",
            get(handlers::preview::optimized_image),
        )
        .route(
            "/preview/model/{user}/{*path}",
            get(handlers::preview::web_model),
        )
        .route("/preview/warm/{user}/{*path}", post(handlers::preview::warm))
        .route("/preview/jobs/{key}", get(handlers::preview::job_status))
        .route("/preview/blob/{name}", get(handlers::preview::model_blob))
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}

fn build_cors_layer(state: &AppState) -> CorsLayer {
    let origins = &state.config.server.cors.allowed_origins;
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
