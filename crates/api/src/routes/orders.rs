//! Order CRUD endpoints.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{NewOrder, Order, OrderUpdate};
use messaging::EventPublisher;
use order_store::OrderStore;
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, P> {
    pub store: S,
    pub publisher: P,
}

impl<S, P> AppState<S, P> {
    pub fn new(store: S, publisher: P) -> Self {
        Self { store, publisher }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// GET /orders: list all orders, oldest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + 'static, P: EventPublisher + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.store.find_all().await?))
}

/// GET /orders/{id}: load a single order.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + 'static, P: EventPublisher + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = id.parse()?;
    state
        .store
        .find_by_id(order_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

/// POST /orders: create an order and announce it.
///
/// The `order.created` event is best effort: a publish failure is logged
/// and the order is still returned.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: OrderStore + 'static, P: EventPublisher + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(new_order) = payload?;
    let order = state.store.create(new_order).await?;
    metrics::counter!("orders_created_total", "source" => "http").increment(1);

    if let Err(e) = state.publisher.publish_order_created(&order).await {
        tracing::warn!(order_id = %order.id, error = %e, "order created but event not published");
    }

    Ok((StatusCode::CREATED, Json(order)))
}

/// PUT /orders/{id}: apply a partial update.
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: OrderStore + 'static, P: EventPublisher + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
    payload: Result<Json<OrderUpdate>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = id.parse()?;
    let Json(update) = payload?;

    state
        .store
        .update(order_id, update)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

/// DELETE /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: OrderStore + 'static, P: EventPublisher + 'static>(
    State(state): State<Arc<AppState<S, P>>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let order_id: OrderId = id.parse()?;

    if state.store.delete(order_id).await? {
        Ok(Json(MessageResponse {
            message: "Order deleted",
        }))
    } else {
        Err(not_found(&id))
    }
}

fn not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("Order {id} not found"))
}
