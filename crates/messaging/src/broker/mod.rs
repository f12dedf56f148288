//! Broker abstraction and its RabbitMQ and in-memory implementations.

mod memory;
mod rabbitmq;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::BrokerError;

pub use memory::{InMemoryBroker, PublishedMessage};
pub use rabbitmq::{BrokerConfig, BrokerConnection};

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Broker-assigned identifier of a delivery, used to settle it.
pub type DeliveryTag = u64;

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: DeliveryTag,
    pub body: Vec<u8>,
    /// True if the broker delivered this message before without it being acked.
    pub redelivered: bool,
}

/// A stream of deliveries for one consumer. Ends when the channel closes.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery>> + Send>>;

/// The broker operations the ingestion pipeline relies on.
///
/// One handle is shared by the consumer and the publisher, so every
/// implementation must tolerate concurrent calls (Send + Sync).
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declares a durable queue. Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<()>;

    /// Declares a durable topic exchange. Idempotent.
    async fn declare_topic_exchange(&self, exchange: &str) -> Result<()>;

    /// Publishes a persistent JSON message.
    ///
    /// Returns once the broker has accepted the message for routing; says
    /// nothing about delivery to any subscriber.
    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()>;

    /// Registers a consumer on `queue` and returns its deliveries.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Acknowledges a delivery.
    async fn ack(&self, delivery_tag: DeliveryTag) -> Result<()>;

    /// Rejects a delivery. Without requeue the broker dead-letters or drops it.
    async fn reject(&self, delivery_tag: DeliveryTag, requeue: bool) -> Result<()>;
}

#[async_trait]
impl<T: Broker + ?Sized> Broker for Arc<T> {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        (**self).declare_queue(queue).await
    }

    async fn declare_topic_exchange(&self, exchange: &str) -> Result<()> {
        (**self).declare_topic_exchange(exchange).await
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
        (**self).publish(exchange, routing_key, payload).await
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        (**self).consume(queue, consumer_tag).await
    }

    async fn ack(&self, delivery_tag: DeliveryTag) -> Result<()> {
        (**self).ack(delivery_tag).await
    }

    async fn reject(&self, delivery_tag: DeliveryTag, requeue: bool) -> Result<()> {
        (**self).reject(delivery_tag, requeue).await
    }
}
