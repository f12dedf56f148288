//! Publication of `order.created` events.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use domain::Order;
use serde::{Deserialize, Serialize};

use crate::broker::Broker;
use crate::error::PublishError;
use crate::token::TokenIssuer;

/// Topic exchange that carries order lifecycle events.
pub const ORDERS_EXCHANGE: &str = "orders";

/// Routing key of the order-created event.
pub const ORDER_CREATED_ROUTING_KEY: &str = "order.created";

/// Value of the envelope's `event` field for a created order.
pub const ORDER_CREATED_EVENT: &str = "order.created";

/// Envelope published when an order is created.
///
/// `token` proves the event came from this service. It says nothing about
/// the order itself: subscribers must not treat it as a signature over `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub event: String,
    pub data: Order,
    pub token: String,
}

impl OrderCreatedEvent {
    pub fn new(order: Order, token: String) -> Self {
        Self {
            event: ORDER_CREATED_EVENT.to_string(),
            data: order,
            token,
        }
    }
}

/// Announces created orders to interested subscribers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an `order.created` event for `order`.
    ///
    /// Success means the broker accepted the message, nothing more.
    async fn publish_order_created(&self, order: &Order) -> Result<(), PublishError>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish_order_created(&self, order: &Order) -> Result<(), PublishError> {
        (**self).publish_order_created(order).await
    }
}

/// Publishes order events on the `orders` topic exchange with a fresh service
/// token per message.
pub struct SignedEventPublisher<B: Broker> {
    broker: Arc<B>,
    issuer: TokenIssuer,
    exchange: String,
}

impl<B: Broker> SignedEventPublisher<B> {
    pub fn new(broker: Arc<B>, issuer: TokenIssuer) -> Self {
        Self {
            broker,
            issuer,
            exchange: ORDERS_EXCHANGE.to_string(),
        }
    }

    /// Publishes to `exchange` instead of [`ORDERS_EXCHANGE`].
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    async fn try_publish(&self, order: &Order) -> Result<(), PublishError> {
        self.broker.declare_topic_exchange(&self.exchange).await?;

        let token = self.issuer.issue()?;
        let payload = serde_json::to_vec(&OrderCreatedEvent::new(order.clone(), token))?;

        self.broker
            .publish(&self.exchange, ORDER_CREATED_ROUTING_KEY, &payload)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<B: Broker> EventPublisher for SignedEventPublisher<B> {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id, exchange = %self.exchange))]
    async fn publish_order_created(&self, order: &Order) -> Result<(), PublishError> {
        let start = Instant::now();
        let result = self.try_publish(order).await;

        metrics::histogram!("order_event_publish_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match &result {
            Ok(()) => {
                metrics::counter!("order_events_published_total").increment(1);
                tracing::debug!("order.created event published");
            }
            Err(e) => {
                metrics::counter!("order_events_publish_failed_total").increment(1);
                tracing::warn!(error = %e, "failed to publish order.created event");
            }
        }

        result
    }
}
