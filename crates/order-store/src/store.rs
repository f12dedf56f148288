use async_trait::async_trait;
use domain::{NewOrder, Order, OrderUpdate};

use crate::{OrderId, Result};

/// Core trait for order store implementations.
///
/// The store owns the order lifecycle: it assigns ids, maintains the
/// `createdAt`/`updatedAt` timestamps and refuses payloads that violate the
/// order field constraints. All implementations must be safe to call
/// concurrently from HTTP handlers and queue consumers (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Returns every stored order, oldest first.
    async fn find_all(&self) -> Result<Vec<Order>>;

    /// Retrieves a single order.
    ///
    /// Returns None if no order has this id.
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>>;

    /// Validates and persists a new order.
    ///
    /// Fails with `Validation` when a field constraint is violated; nothing
    /// is stored in that case.
    async fn create(&self, new_order: NewOrder) -> Result<Order>;

    /// Applies a partial update to an existing order.
    ///
    /// Returns None if no order has this id.
    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Option<Order>>;

    /// Deletes an order.
    ///
    /// Returns true if an order was removed.
    async fn delete(&self, id: OrderId) -> Result<bool>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for std::sync::Arc<T> {
    async fn find_all(&self) -> Result<Vec<Order>> {
        (**self).find_all().await
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        (**self).find_by_id(id).await
    }

    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        (**self).create(new_order).await
    }

    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Option<Order>> {
        (**self).update(id, update).await
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        (**self).delete(id).await
    }
}
