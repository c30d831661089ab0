//! Handlers for the fulfilment workflow.
//!
//! Each handler wraps one stage of an order's life: generating documents,
//! delivering them, and the staff/client actions taken in between.

pub mod actions;
pub mod delivery;
pub mod fulfilment;

pub use actions::OrderActions;
pub use delivery::DeliveryHandler;
pub use fulfilment::FulfilmentHandler;

use crate::state::OrderStateError;
use thiserror::Error;

/// Errors raised by the workflow handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
	#[error(transparent)]
	State(#[from] OrderStateError),
	#[error("Notification error: {0}")]
	Notification(String),
}

/// Actor recorded in the audit trail for automated changes.
pub const WORKFLOW_ACTOR: &str = "system:workflow";
pub const DELIVERY_ACTOR: &str = "system:delivery";
pub const WEBHOOK_ACTOR: &str = "webhook";
