//! Staff and client actions on an order.

use super::HandlerError;
use crate::state::{OrderStateError, OrderStateMachine};
use std::sync::Arc;
use tracing::instrument;
use vault_notify::{EmailMessage, NotificationService};
use vault_types::{truncate_id, Order, OrderStatus};

pub struct OrderActions {
	state_machine: Arc<OrderStateMachine>,
	notifications: Arc<NotificationService>,
}

impl OrderActions {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		notifications: Arc<NotificationService>,
	) -> Self {
		Self {
			state_machine,
			notifications,
		}
	}

	/// Records a confirmed payment and starts the SLA clock.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn mark_paid(
		&self,
		order_id: &str,
		payment_reference: &str,
		actor: &str,
	) -> Result<Order, HandlerError> {
		let order = self
			.state_machine
			.transition_with(order_id, OrderStatus::Paid, actor, None, |order| {
				order.payment_reference = Some(payment_reference.to_string());
				Ok(())
			})
			.await?;
		Ok(order)
	}

	/// Approves the current version; it is locked for delivery.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn approve(
		&self,
		order_id: &str,
		actor: &str,
		note: Option<String>,
	) -> Result<Order, HandlerError> {
		Ok(self
			.state_machine
			.transition(order_id, OrderStatus::Finalising, actor, note)
			.await?)
	}

	/// Sends the order back for regeneration with reviewer notes.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn request_regeneration(
		&self,
		order_id: &str,
		actor: &str,
		notes: &str,
	) -> Result<Order, HandlerError> {
		let order = self
			.state_machine
			.transition_with(
				order_id,
				OrderStatus::RegenRequested,
				actor,
				Some(notes.to_string()),
				|order| {
					if order.is_locked() {
						return Err(OrderStateError::VersionLocked(order.id.clone()));
					}
					order.regen_notes = Some(notes.to_string());
					Ok(())
				},
			)
			.await?;
		Ok(order)
	}

	/// Pauses fulfilment until the client supplies more information, and
	/// tells the client what is needed.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn request_client_input(
		&self,
		order_id: &str,
		actor: &str,
		question: &str,
	) -> Result<Order, HandlerError> {
		let order = self
			.state_machine
			.transition(
				order_id,
				OrderStatus::ClientInputRequired,
				actor,
				Some(question.to_string()),
			)
			.await?;

		let message = EmailMessage::transactional(
			&order.client_email,
			"We need a little more information",
			format!(
				"Hello,\n\nTo continue with order {} we need the following:\n\n{}\n\n\
				Please reply through your dashboard.\n",
				order.id, question
			),
		)
		.with_tag("client-input-required");
		if let Err(e) = self.notifications.send(&message).await {
			tracing::warn!(error = %e, "Failed to email client input request");
		}
		Ok(order)
	}

	/// Stores the client's answers and re-queues the order.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn submit_client_input(
		&self,
		order_id: &str,
		actor: &str,
		inputs: serde_json::Map<String, serde_json::Value>,
	) -> Result<Order, HandlerError> {
		let order = self
			.state_machine
			.transition_with(order_id, OrderStatus::Queued, actor, None, |order| {
				order.client_inputs.extend(inputs);
				Ok(())
			})
			.await?;
		Ok(order)
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn cancel(
		&self,
		order_id: &str,
		actor: &str,
		note: Option<String>,
	) -> Result<Order, HandlerError> {
		Ok(self
			.state_machine
			.transition(order_id, OrderStatus::Cancelled, actor, note)
			.await?)
	}

	/// Re-queues a failed order.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn retry(&self, order_id: &str, actor: &str) -> Result<Order, HandlerError> {
		let order = self
			.state_machine
			.transition_with(order_id, OrderStatus::Queued, actor, None, |order| {
				if order.status != OrderStatus::Failed {
					return Err(OrderStateError::InvalidTransition {
						from: order.status,
						to: OrderStatus::Queued,
					});
				}
				order.failure_reason = None;
				Ok(())
			})
			.await?;
		Ok(order)
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn archive(&self, order_id: &str, actor: &str) -> Result<Order, HandlerError> {
		Ok(self
			.state_machine
			.transition(order_id, OrderStatus::Archived, actor, None)
			.await?)
	}
}
