//! Domain layer for the order service.
//!
//! This crate provides the order record and the rules every stored order
//! must satisfy:
//! - `Order`, the persisted entity with store-managed id and timestamps
//! - `NewOrder` and `OrderUpdate`, the creation and partial-update payloads
//! - `OrderStatus` and `OrderItem` value types
//! - `OrderError`, raised when a payload violates a field constraint

pub mod order;

pub use order::{NewOrder, Order, OrderError, OrderItem, OrderStatus, OrderUpdate, ProductId};
