//! State management for fulfilment orders.

pub mod order;
pub mod versions;

pub use order::{OrderStateError, OrderStateMachine};
