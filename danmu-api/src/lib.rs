//! HTTP surface for the danmaku aggregation proxy.

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use danmu_core::{Orchestrator, RateLimiter};

pub use error::{AppError, AppResult};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            rate_limiter: RateLimiter::new(),
        }
    }
}

/// Build the full application: the routed API wrapped in the gateway
/// (token gate + path normalization + rate limit), which must run before
/// routing so it can rewrite the path the router sees.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/", get(routes::statics::banner))
        .route("/favicon.ico", get(routes::statics::favicon))
        .route("/robots.txt", get(routes::statics::robots))
        .route("/api/config", get(routes::config::get_config))
        .route("/api/config", put(routes::config::put_config))
        .route("/api/v2/search/anime", get(routes::search::search_anime))
        .route("/api/v2/search/episodes", get(routes::search::search_episodes))
        .route("/api/v2/match", post(routes::matching::match_file))
        .route("/api/v2/bangumi/{id}", get(routes::bangumi::bangumi))
        .route("/api/v2/comment", get(routes::comment::comment_by_url))
        .route("/api/v2/comment/{id}", get(routes::comment::comment_by_id))
        .with_state(state.clone());

    let gated = ServiceBuilder::new()
        .layer(from_fn_with_state(state, middleware::gateway))
        .service(api);

    Router::new()
        .fallback_service(gated)
        .layer(TraceLayer::new_for_http())
}
