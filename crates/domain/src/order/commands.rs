//! Order creation and update payloads.

use serde::{Deserialize, Serialize};

use super::{
    OrderError, OrderItem, OrderStatus, validate_client_id, validate_items, validate_total,
};

/// Fields of an order to be created.
///
/// This is both the body of `POST /orders` and the body of an
/// `orders.create` queue message. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    /// The ordering party.
    pub client_id: String,

    /// Ordered lines; at least one.
    pub items: Vec<OrderItem>,

    /// Order total.
    pub total: f64,

    /// Initial status, `PENDING` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

impl NewOrder {
    /// Creates a new order payload with the default status.
    pub fn new(client_id: impl Into<String>, items: Vec<OrderItem>, total: f64) -> Self {
        Self {
            client_id: client_id.into(),
            items,
            total,
            status: None,
        }
    }

    /// Sets the initial status.
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Checks every field constraint of a stored order.
    pub fn validate(&self) -> Result<(), OrderError> {
        validate_client_id(&self.client_id)?;
        validate_items(&self.items)?;
        validate_total(self.total)
    }
}

/// Partial update of a stored order.
///
/// Absent fields are left untouched; present fields are validated with the
/// same rules as on creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderItem>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

impl OrderUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn items(mut self, items: Vec<OrderItem>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn total(mut self, total: f64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Checks the constraints of every field that is present.
    pub fn validate(&self) -> Result<(), OrderError> {
        if let Some(ref client_id) = self.client_id {
            validate_client_id(client_id)?;
        }
        if let Some(ref items) = self.items {
            validate_items(items)?;
        }
        if let Some(total) = self.total {
            validate_total(total)?;
        }
        Ok(())
    }
}
