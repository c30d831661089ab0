//! Delivery of approved documents to the client.

use super::{HandlerError, DELIVERY_ACTOR};
use crate::state::{OrderStateError, OrderStateMachine};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use vault_notify::{render_template, EmailMessage, NotificationService};
use vault_types::{truncate_id, Order, OrderStatus};

const SUBJECT: &str = "Your {{service}} documents are ready";
const BODY: &str = "Hello,\n\n\
Your documents for order {{order_id}} have been approved and are attached to \
your account.\n\n\
File: {{filename}} (version {{version}})\n\
Fingerprint: {{content_hash}}\n\n\
Thank you for using Compliance Vault Pro.\n";

pub struct DeliveryHandler {
	state_machine: Arc<OrderStateMachine>,
	notifications: Arc<NotificationService>,
}

impl DeliveryHandler {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		notifications: Arc<NotificationService>,
	) -> Self {
		Self {
			state_machine,
			notifications,
		}
	}

	/// Emails the locked version to the client and completes the order.
	///
	/// When the email cannot be sent the order stays in FINALISING and a
	/// `Notification` error is returned so the next run retries.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn deliver(&self, order_id: &str) -> Result<Order, HandlerError> {
		let order = self.state_machine.get_order(order_id).await?;
		if order.status != OrderStatus::Finalising {
			return Err(OrderStateError::InvalidTransition {
				from: order.status,
				to: OrderStatus::Completed,
			}
			.into());
		}
		let version = order
			.current_version()
			.filter(|v| v.locked)
			.ok_or_else(|| OrderStateError::NoDocuments(order.id.clone()))?;

		let vars = HashMap::from([
			("service".to_string(), order.service_code.replace('_', " ")),
			("order_id".to_string(), order.id.clone()),
			("filename".to_string(), version.filename.clone()),
			("version".to_string(), version.version.to_string()),
			("content_hash".to_string(), version.content_hash.clone()),
		]);
		let message = EmailMessage::transactional(
			&order.client_email,
			render_template(SUBJECT, &vars),
			render_template(BODY, &vars),
		)
		.with_tag("order-delivered");

		self.notifications
			.send(&message)
			.await
			.map_err(|e| HandlerError::Notification(e.to_string()))?;

		let note = format!("delivered version {}", version.version);
		let completed = self
			.state_machine
			.transition(order_id, OrderStatus::Completed, DELIVERY_ACTOR, Some(note))
			.await?;
		Ok(completed)
	}
}
