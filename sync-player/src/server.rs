//! Shared application state and router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::Router;
use moka::future::Cache;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use sync_player_core::config::Config;
use sync_player_core::prober::TrackProber;
use sync_player_core::rate_limit::RateLimiter;
use sync_player_core::registry::RoomRegistry;
use sync_player_core::store::Store;

use crate::http::csrf::CsrfSessions;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: RoomRegistry,
    pub store: Store,
    pub rate_limiter: RateLimiter,
    pub prober: Arc<dyn TrackProber>,
    /// `GET /api/files` listing cache (spec §6.3: cached 20s).
    pub files_cache: Cache<(), Vec<String>>,
    pub csrf_sessions: CsrfSessions,
}

impl AppState {
    pub fn new(config: Arc<Config>, registry: RoomRegistry, store: Store, prober: Arc<dyn TrackProber>) -> Self {
        Self {
            config,
            registry,
            store,
            rate_limiter: RateLimiter::new(),
            prober,
            files_cache: Cache::builder().time_to_live(Duration::from_secs(20)).max_capacity(1).build(),
            csrf_sessions: CsrfSessions::default(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(allowed_origin(&state.config))
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static("x-csrf-token"),
        ]);

    Router::new()
        .merge(crate::http::pages::routes())
        .merge(crate::http::rooms_api::routes())
        .merge(crate::http::media_api::routes())
        .merge(crate::http::ws::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn allowed_origin(config: &Config) -> tower_http::cors::AllowOrigin {
    if config.use_https {
        tower_http::cors::AllowOrigin::exact(HeaderValue::from_static("https://localhost"))
    } else {
        tower_http::cors::AllowOrigin::mirror_request()
    }
}
