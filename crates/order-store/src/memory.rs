use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use domain::{NewOrder, Order, OrderUpdate};
use tokio::sync::RwLock;

use crate::{OrderId, OrderStoreError, Result, store::OrderStore};

/// In-memory order store implementation.
///
/// Used by tests and by the API server when no database is configured.
/// Provides the same interface and validation as the PostgreSQL
/// implementation. Clones share the same underlying orders.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<Vec<Order>>>,
    failures_remaining: Arc<AtomicUsize>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Removes all orders.
    pub async fn clear(&self) {
        self.orders.write().await.clear();
    }

    /// Makes the next `count` operations fail with `Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if injected {
            return Err(OrderStoreError::Unavailable(
                "injected in-memory store failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_all(&self) -> Result<Vec<Order>> {
        self.check_available()?;
        Ok(self.orders.read().await.clone())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        self.check_available()?;
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|o| o.id == id).cloned())
    }

    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        self.check_available()?;
        let order = Order::create(OrderId::new(), new_order, Utc::now())?;
        self.orders.write().await.push(order.clone());
        Ok(order)
    }

    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Option<Order>> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        let Some(order) = orders.iter_mut().find(|o| o.id == id) else {
            return Ok(None);
        };

        order.apply_update(update, Utc::now())?;
        Ok(Some(order.clone()))
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        let before = orders.len();
        orders.retain(|o| o.id != id);
        Ok(orders.len() < before)
    }
}
