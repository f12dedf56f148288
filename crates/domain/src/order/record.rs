//! The stored order record.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use super::{NewOrder, OrderError, OrderItem, OrderStatus, OrderUpdate};

/// A persisted order.
///
/// Only the order store constructs these, through [`Order::create`] and
/// [`Order::apply_update`], so a stored order always satisfies the field
/// constraints checked by [`NewOrder::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Store-assigned identifier.
    pub id: OrderId,

    /// The ordering party.
    pub client_id: String,

    /// Ordered lines.
    pub items: Vec<OrderItem>,

    /// Order total.
    pub total: f64,

    /// Current status.
    pub status: OrderStatus,

    /// When the order was created; never changes.
    pub created_at: DateTime<Utc>,

    /// When the order was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validates `new_order` and builds the record the store will persist.
    pub fn create(id: OrderId, new_order: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        new_order.validate()?;

        Ok(Self {
            id,
            client_id: new_order.client_id,
            items: new_order.items,
            total: new_order.total,
            status: new_order.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Validates `update` and applies it, refreshing `updated_at`.
    ///
    /// The record is left untouched when validation fails.
    pub fn apply_update(&mut self, update: OrderUpdate, now: DateTime<Utc>) -> Result<(), OrderError> {
        update.validate()?;

        if let Some(client_id) = update.client_id {
            self.client_id = client_id;
        }
        if let Some(items) = update.items {
            self.items = items;
        }
        if let Some(total) = update.total {
            self.total = total;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        self.updated_at = now;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_order() -> NewOrder {
        NewOrder::new("c1", vec![OrderItem::new("p1", 2, 10.0)], 20.0)
    }

    #[test]
    fn test_create_defaults_to_pending() {
        let now = Utc::now();
        let order = Order::create(OrderId::new(), new_order(), now).unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.created_at, now);
        assert_eq!(order.updated_at, now);
    }

    #[test]
    fn test_create_keeps_explicit_status() {
        let order = Order::create(
            OrderId::new(),
            new_order().with_status(OrderStatus::Paid),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn test_create_rejects_invalid_payload() {
        let mut payload = new_order();
        payload.items.clear();
        assert_eq!(
            Order::create(OrderId::new(), payload, Utc::now()),
            Err(OrderError::NoItems)
        );
    }

    #[test]
    fn test_update_refreshes_updated_at_only() {
        let created = Utc::now();
        let mut order = Order::create(OrderId::new(), new_order(), created).unwrap();
        let later = created + Duration::seconds(5);

        order
            .apply_update(OrderUpdate::new().status(OrderStatus::Cancelled), later)
            .unwrap();

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.created_at, created);
        assert_eq!(order.updated_at, later);
        assert_eq!(order.client_id, "c1");
    }

    #[test]
    fn test_invalid_update_leaves_order_untouched() {
        let mut order = Order::create(OrderId::new(), new_order(), Utc::now()).unwrap();
        let before = order.clone();

        let result = order.apply_update(
            OrderUpdate::new().status(OrderStatus::Paid).total(-5.0),
            Utc::now(),
        );

        assert!(result.is_err());
        assert_eq!(order, before);
    }

    #[test]
    fn test_serializes_camel_case() {
        let order = Order::create(OrderId::new(), new_order(), Utc::now()).unwrap();
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["id"], order.id.to_string());
        assert_eq!(json["clientId"], "c1");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["total"], 20.0);
        assert!(json["createdAt"].is_string());
        assert!(json["updatedAt"].is_string());
    }
}
