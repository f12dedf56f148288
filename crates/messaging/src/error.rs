//! Messaging error types.

use order_store::OrderStoreError;
use thiserror::Error;

use crate::broker::DeliveryTag;

/// Errors raised by a broker connection.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker is unreachable or rejected the credentials.
    #[error("Broker connection failed: {0}")]
    Connection(String),

    /// An operation was attempted before `connect()` completed or after `close()`.
    #[error("Broker is not connected")]
    NotConnected,

    /// A queue or exchange could not be declared.
    #[error("Failed to declare {name}: {reason}")]
    Declare { name: String, reason: String },

    /// The broker did not accept a published message.
    #[error("Failed to publish to exchange '{exchange}' with key '{routing_key}': {reason}")]
    Publish {
        exchange: String,
        routing_key: String,
        reason: String,
    },

    /// A consumer could not be registered or its delivery stream failed.
    #[error("Failed to consume from {queue}: {reason}")]
    Consume { queue: String, reason: String },

    /// A delivery could not be acknowledged or rejected.
    #[error("Failed to settle delivery {delivery_tag}: {reason}")]
    Settle {
        delivery_tag: DeliveryTag,
        reason: String,
    },
}

impl BrokerError {
    pub fn declare(name: &str, reason: impl std::fmt::Display) -> Self {
        BrokerError::Declare {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn publish(exchange: &str, routing_key: &str, reason: impl std::fmt::Display) -> Self {
        BrokerError::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn consume(queue: &str, reason: impl std::fmt::Display) -> Self {
        BrokerError::Consume {
            queue: queue.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn settle(delivery_tag: DeliveryTag, reason: impl std::fmt::Display) -> Self {
        BrokerError::Settle {
            delivery_tag,
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while minting or checking service tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token is past its expiry.
    #[error("Token has expired")]
    Expired,

    /// The signature does not match the shared secret.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The token was issued for a different service.
    #[error("Token was issued by '{actual}', expected '{expected}'")]
    WrongService { expected: String, actual: String },

    /// The token is malformed.
    #[error("Invalid token: {0}")]
    Invalid(String),

    /// The token could not be signed.
    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Errors raised while publishing an event.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An inbound message body that is not an order-creation payload.
#[derive(Debug, Error)]
#[error("Malformed order message: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// Why an inbound message was rejected.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Order store rejected the order after {attempts} attempt(s): {source}")]
    Store {
        attempts: u32,
        #[source]
        source: OrderStoreError,
    },
}
