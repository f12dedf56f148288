//! Order record and related types.

mod commands;
mod record;
mod state;
mod value_objects;

pub use commands::{NewOrder, OrderUpdate};
pub use record::Order;
pub use state::OrderStatus;
pub use value_objects::{OrderItem, ProductId};

use thiserror::Error;

/// Field constraint violations on order payloads.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// Client ID is required.
    #[error("Client ID is required")]
    ClientIdRequired,

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// An item has an empty product ID.
    #[error("Item {index} has an empty product ID")]
    ProductIdRequired { index: usize },

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// Invalid price.
    #[error("Invalid price for {product_id}: {price} (must be a non-negative number)")]
    InvalidPrice { product_id: String, price: f64 },

    /// Invalid total.
    #[error("Invalid total: {total} (must be a non-negative number)")]
    InvalidTotal { total: f64 },
}

/// Returns true if `amount` is a finite, non-negative number.
pub(crate) fn is_valid_amount(amount: f64) -> bool {
    amount.is_finite() && amount >= 0.0
}

/// Validates the fields shared by creation and update payloads.
pub(crate) fn validate_items(items: &[OrderItem]) -> Result<(), OrderError> {
    if items.is_empty() {
        return Err(OrderError::NoItems);
    }

    for (index, item) in items.iter().enumerate() {
        if item.product_id.as_str().trim().is_empty() {
            return Err(OrderError::ProductIdRequired { index });
        }
        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id.to_string(),
                quantity: item.quantity,
            });
        }
        if !is_valid_amount(item.price) {
            return Err(OrderError::InvalidPrice {
                product_id: item.product_id.to_string(),
                price: item.price,
            });
        }
    }

    Ok(())
}

pub(crate) fn validate_client_id(client_id: &str) -> Result<(), OrderError> {
    if client_id.trim().is_empty() {
        return Err(OrderError::ClientIdRequired);
    }
    Ok(())
}

pub(crate) fn validate_total(total: f64) -> Result<(), OrderError> {
    if !is_valid_amount(total) {
        return Err(OrderError::InvalidTotal { total });
    }
    Ok(())
}
