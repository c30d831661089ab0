//! Document generation for queued orders.

use super::{HandlerError, WORKFLOW_ACTOR};
use crate::state::{versions, OrderStateError, OrderStateMachine};
use std::sync::Arc;
use tracing::instrument;
use vault_documents::{DocumentService, GenerationRequest};
use vault_notify::NotificationService;
use vault_types::{current_timestamp, truncate_id, Order, OrderStatus};

/// Takes an order from QUEUED or REGEN_REQUESTED through generation to
/// INTERNAL_REVIEW, or to FAILED when generation does not succeed.
pub struct FulfilmentHandler {
	state_machine: Arc<OrderStateMachine>,
	documents: Arc<DocumentService>,
	notifications: Arc<NotificationService>,
}

impl FulfilmentHandler {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		documents: Arc<DocumentService>,
		notifications: Arc<NotificationService>,
	) -> Self {
		Self {
			state_machine,
			documents,
			notifications,
		}
	}

	/// Generates a new document version for the order.
	///
	/// A generation failure is not an error of this call: the order is moved
	/// to FAILED and returned.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn generate(&self, order_id: &str) -> Result<Order, HandlerError> {
		let order = self
			.state_machine
			.transition(order_id, OrderStatus::InProgress, WORKFLOW_ACTOR, None)
			.await?;

		if order.is_locked() {
			return self
				.fail(order_id, "approved version is locked; regeneration refused")
				.await;
		}

		let request = GenerationRequest {
			reference: order.id.clone(),
			document_type: order.service_code.clone(),
			inputs: order.client_inputs.clone(),
			notes: order.regen_notes.clone(),
			intent: None,
		};

		let sealed = match self.documents.generate(&request).await {
			Ok(sealed) => sealed,
			Err(e) => {
				tracing::warn!(error = %e, "Document generation failed");
				return self.fail(order_id, &e.to_string()).await;
			},
		};

		let result = self
			.state_machine
			.transition_with(
				order_id,
				OrderStatus::InternalReview,
				WORKFLOW_ACTOR,
				None,
				|order| {
					let version = versions::add_version(order, &sealed, current_timestamp())?;
					tracing::debug!(version, "Document version added");
					order.regen_notes = None;
					order.failure_reason = None;
					Ok(())
				},
			)
			.await;

		match result {
			Ok(order) => Ok(order),
			Err(OrderStateError::VersionLocked(_)) => {
				self.fail(order_id, "approved version is locked; regeneration refused")
					.await
			},
			Err(e) => Err(e.into()),
		}
	}

	async fn fail(&self, order_id: &str, reason: &str) -> Result<Order, HandlerError> {
		let order = self
			.state_machine
			.transition_with(
				order_id,
				OrderStatus::Failed,
				WORKFLOW_ACTOR,
				Some(reason.to_string()),
				|order| {
					order.failure_reason = Some(reason.to_string());
					Ok(())
				},
			)
			.await?;

		if let Err(e) = self
			.notifications
			.notify_operations(
				format!("Order {} failed", truncate_id(order_id)),
				format!("Order {} moved to FAILED: {}", order_id, reason),
			)
			.await
		{
			tracing::warn!(error = %e, "Failed to alert operations");
		}
		Ok(order)
	}
}
