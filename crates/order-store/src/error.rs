use common::OrderId;
use domain::OrderError;
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum OrderStoreError {
    /// The order payload violates a field constraint.
    #[error("Validation failed: {0}")]
    Validation(#[from] OrderError),

    /// A stored row could not be turned back into an order.
    #[error("Corrupt order {id}: {reason}")]
    Corrupt { id: OrderId, reason: String },

    /// The store is temporarily unable to serve requests.
    #[error("Order store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrderStoreError {
    /// Returns true if retrying the same operation later may succeed.
    ///
    /// Connection-level failures are transient; anything the payload or the
    /// stored data is responsible for is not.
    pub fn is_transient(&self) -> bool {
        match self {
            OrderStoreError::Unavailable(_) => true,
            OrderStoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            OrderStoreError::Validation(_)
            | OrderStoreError::Corrupt { .. }
            | OrderStoreError::Migration(_)
            | OrderStoreError::Serialization(_) => false,
        }
    }
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, OrderStoreError>;
