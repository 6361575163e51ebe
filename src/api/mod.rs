//! HTTP surface (spec.md §4.7–§4.8): router composition mirroring this
//! codebase's indexer API — one `Router` per route family, merged, layered
//! with CORS and request tracing, served via `axum::serve`.

pub mod envelope;
mod handlers;
mod routes;
pub mod responses;

pub use routes::*;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::adapters::rental::RentalMarketplaceAdapter;
use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::history::HistoryStore;
use crate::models::RentalDataSource;
use crate::models::RentalPriceStats;

const RENTAL_CACHE_TTL_SECS: u64 = 60;

pub struct RentalCacheEntry {
    pub computed_at: Instant,
    pub prices: HashMap<String, RentalPriceStats>,
    pub source: RentalDataSource,
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct ApiState {
    pub aggregator: Arc<Aggregator>,
    pub history: Arc<HistoryStore>,
    pub rental_adapter: Arc<RentalMarketplaceAdapter>,
    pub config: Arc<Config>,
    pub rental_cache: Arc<RwLock<Option<RentalCacheEntry>>>,
}

impl ApiState {
    pub fn new(
        aggregator: Arc<Aggregator>,
        history: Arc<HistoryStore>,
        rental_adapter: Arc<RentalMarketplaceAdapter>,
        config: Arc<Config>,
    ) -> Self {
        Self { aggregator, history, rental_adapter, config, rental_cache: Arc::new(RwLock::new(None)) }
    }

    pub fn rental_cache_is_fresh(entry: &RentalCacheEntry) -> bool {
        entry.computed_at.elapsed().as_secs() < RENTAL_CACHE_TTL_SECS
    }
}

pub fn create_app(state: ApiState) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins).allow_methods(tower_http::cors::Any)
    };

    Router::new()
        .merge(create_core_routes())
        .merge(create_envelope_routes())
        .merge(create_rental_routes())
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Starts the HTTP server, returning a handle that completes once the
/// graceful-shutdown signal fires and in-flight requests finish (spec.md
/// §4.6 "outstanding HTTP responses in flight must be allowed to
/// complete").
pub async fn start_server(
    state: ApiState,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let app = create_app(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "API server listening");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            tracing::error!(error = %e, "API server error");
        }
    }))
}
