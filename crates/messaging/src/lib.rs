//! Asynchronous order ingestion and event propagation.
//!
//! This crate connects the order store to the message broker:
//! 1. [`OrderIngestionConsumer`] drains the durable `orders.create` queue,
//!    persists each valid order and acknowledges or dead-letters the message
//! 2. [`SignedEventPublisher`] announces every created order on the `orders`
//!    topic exchange, carrying a short-lived service token
//!
//! Both borrow a shared [`Broker`] handle. [`BrokerConnection`] talks to
//! RabbitMQ; [`InMemoryBroker`] backs tests and local runs.

pub mod broker;
pub mod consumer;
pub mod error;
pub mod publisher;
pub mod token;

pub use broker::{
    Broker, BrokerConfig, BrokerConnection, Delivery, DeliveryStream, DeliveryTag,
    InMemoryBroker, PublishedMessage,
};
pub use consumer::{
    CREATE_ORDER_QUEUE, ConsumerConfig, Disposition, OrderIngestionConsumer, Outcome, RetryPolicy,
};
pub use error::{BrokerError, DecodeError, IngestError, PublishError, TokenError};
pub use publisher::{
    EventPublisher, ORDER_CREATED_EVENT, ORDER_CREATED_ROUTING_KEY, ORDERS_EXCHANGE,
    OrderCreatedEvent, SignedEventPublisher,
};
pub use token::{SERVICE_NAME, ServiceClaims, TOKEN_TTL, TokenIssuer, TokenVerifier};
