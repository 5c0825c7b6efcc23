//! Application wiring: `AppState`, middleware stack (§10.7), and route
//! mounting.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::services::admission::InProcessLimiter;
use domain::services::GeofenceIndex;
use domain::store::StoreAdapter;

use cache::Cache;

use crate::config::Config;
use crate::middleware::{
    admission_middleware, metrics_handler, metrics_middleware, security_headers_middleware,
    trace_id, CacheWindowCounter,
};
use crate::routes::{devices, geofences, health, webhooks};
use crate::services::{geofence_index_sync, IngestionService, WebhookDispatcher};

/// Shared application state (§10.7): the store/cache handles plus the core
/// services built on top of them.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub store: Arc<dyn StoreAdapter>,
    pub cache: Arc<dyn Cache>,
    pub geofence_index: Arc<GeofenceIndex>,
    pub window_counter: Arc<CacheWindowCounter>,
    /// Fallback limiter used when the cache-backed window counter errors
    /// (spec.md:103: "falls back to an in-process window with identical
    /// semantics and logs degraded mode").
    pub degraded_limiter: Arc<InProcessLimiter>,
    pub ingestion: Arc<IngestionService>,
    pub webhooks: Arc<WebhookDispatcher>,
}

#[allow(clippy::too_many_arguments)]
pub fn create_app(
    config: Config,
    pool: PgPool,
    store: Arc<dyn StoreAdapter>,
    cache: Arc<dyn Cache>,
) -> Router {
    let config = Arc::new(config);

    let geofence_index = Arc::new(GeofenceIndex::new());
    let window_counter = Arc::new(CacheWindowCounter::new(cache.clone()));
    let degraded_limiter = Arc::new(InProcessLimiter::new());

    geofence_index_sync::spawn(cache.clone(), geofence_index.clone());

    let webhooks = WebhookDispatcher::new(
        cache.clone(),
        Duration::from_secs(config.core.webhook_timeout_secs),
        config.core.webhook_worker_pool_size,
        config.core.webhook_queue_high_water_mark,
        Duration::from_secs(config.cache.webhook_subscription_ttl_secs),
        Duration::from_secs(config.cache.webhook_delivery_ttl_secs),
    );

    let ingestion = Arc::new(IngestionService::new(
        store.clone(),
        cache.clone(),
        geofence_index.clone(),
        webhooks.clone(),
        config.core.gap_threshold_secs,
        Duration::from_secs(config.cache.device_location_ttl_secs),
        Duration::from_secs(config.cache.device_state_ttl_secs),
    ));

    let state = AppState {
        pool,
        config: config.clone(),
        store,
        cache,
        geofence_index,
        window_counter,
        degraded_limiter,
        ingestion,
        webhooks,
    };

    let cors = if config.security.cors_origins.is_empty() || config.security.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config.security.cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
    };

    let device_routes = Router::new()
        .route("/devices", post(devices::create_device))
        .route("/devices/nearby", post(devices::nearby_devices))
        .route("/devices/locations/bulk", post(devices::bulk_update_locations))
        .route("/devices/:device_id/location", put(devices::update_location))
        .route("/devices/:device_id/trajectory", get(devices::get_trajectory))
        .route("/devices/:device_id/stats", get(devices::get_device_stats));

    let geofence_routes = Router::new()
        .route("/geofences", post(geofences::create_geofence))
        .route(
            "/geofences/:geofence_id",
            get(geofences::get_geofence).put(geofences::update_geofence).delete(geofences::delete_geofence),
        )
        .route("/geofences/check", post(geofences::check_point))
        .route("/geofences/containing/point", get(geofences::containing_point))
        .route("/geofences/nearby/point", get(geofences::nearby_point))
        .route(
            "/geofences/:geofence_id/webhook",
            post(webhooks::create_webhook).get(webhooks::get_webhook).delete(webhooks::delete_webhook),
        )
        .route("/geofences/:geofence_id/webhook/stats", get(webhooks::get_webhook_stats));

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    let api_routes = Router::new()
        .merge(device_routes)
        .merge(geofence_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), admission_middleware));

    // Middleware order (§10.7, bottom layers run first): tracing -> request
    // id -> compression -> CORS -> security headers -> timeout -> admission
    // control -> routing.
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs)))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(trace_id))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
