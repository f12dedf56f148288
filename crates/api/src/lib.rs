//! HTTP API for the orders service.
//!
//! Provides CRUD endpoints over the order store, with structured logging
//! (tracing) and Prometheus metrics. Orders created over HTTP are announced
//! on the `orders` exchange the same way as orders ingested from the queue.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use messaging::EventPublisher;
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, P>(state: Arc<AppState<S, P>>, metrics_handle: PrometheusHandle) -> Router
where
    S: OrderStore + 'static,
    P: EventPublisher + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            get(routes::orders::list::<S, P>).post(routes::orders::create::<S, P>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S, P>)
                .put(routes::orders::update::<S, P>)
                .delete(routes::orders::delete::<S, P>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
