//! Order state machine implementation.
//!
//! Orders move DRAFT -> PAID -> QUEUED -> IN_PROGRESS -> INTERNAL_REVIEW ->
//! FINALISING -> COMPLETED, with review loops through REGEN_REQUESTED and
//! CLIENT_INPUT_REQUIRED and exits to CANCELLED, FAILED and ARCHIVED. Every
//! transition is checked against a static table and applied inside a single
//! storage read-modify-write, together with its audit entry and SLA effects.

use super::versions;
use crate::sla;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use vault_config::SlaConfig;
use vault_storage::{QueryFilter, StorageError, StorageService};
use vault_types::{
	current_timestamp, truncate_id, AuditEntry, NewOrder, Order, OrderStatus, SlaTracking,
	StorageKey,
};

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("Order {0} has a locked document version")]
	VersionLocked(String),
	#[error("Order {0} has no generated documents")]
	NoDocuments(String),
}

/// Static transition table - each status maps to its allowed next statuses.
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	use OrderStatus::*;

	let mut m = HashMap::new();
	m.insert(Draft, HashSet::from([Paid, Cancelled]));
	m.insert(Paid, HashSet::from([Queued, Cancelled, Failed]));
	m.insert(Queued, HashSet::from([InProgress, Cancelled, Failed]));
	m.insert(
		InProgress,
		HashSet::from([InternalReview, ClientInputRequired, Failed]),
	);
	m.insert(
		InternalReview,
		HashSet::from([Finalising, RegenRequested, ClientInputRequired, Cancelled]),
	);
	m.insert(RegenRequested, HashSet::from([InProgress, Cancelled]));
	m.insert(ClientInputRequired, HashSet::from([Queued, Cancelled]));
	m.insert(Finalising, HashSet::from([Completed, Failed]));
	m.insert(Completed, HashSet::from([Archived]));
	m.insert(Cancelled, HashSet::from([Archived]));
	m.insert(Failed, HashSet::from([Queued, Archived]));
	m.insert(Archived, HashSet::new()); // terminal
	m
});

/// Checks if a state transition is valid.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
	TRANSITIONS
		.get(&from)
		.is_some_and(|allowed| allowed.contains(&to))
}

/// Manages order state transitions and persistence.
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
	sla: SlaConfig,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>, sla: SlaConfig) -> Self {
		Self { storage, sla }
	}

	/// Stores a new DRAFT order with its creation audit entry.
	pub async fn create_order(
		&self,
		new_order: NewOrder,
		actor: &str,
	) -> Result<Order, OrderStateError> {
		let now = current_timestamp();
		let order = Order {
			id: uuid::Uuid::new_v4().to_string(),
			client_id: new_order.client_id,
			client_email: new_order.client_email,
			organization_id: new_order.organization_id,
			service_code: new_order.service_code,
			tier: new_order.tier,
			status: OrderStatus::Draft,
			created_at: now,
			updated_at: now,
			documents: Vec::new(),
			sla: SlaTracking::default(),
			audit_trail: vec![AuditEntry {
				at: now,
				from: None,
				to: OrderStatus::Draft,
				actor: actor.to_string(),
				note: None,
			}],
			client_inputs: new_order.client_inputs,
			payment_reference: None,
			regen_notes: None,
			failure_reason: None,
		};

		self.storage
			.insert_new(StorageKey::Orders.as_str(), &order.id, &order, None)
			.await?;
		tracing::info!(order_id = %truncate_id(&order.id), service = %order.service_code, "Order created");
		Ok(order)
	}

	/// Moves an order to `to`, recording who did it.
	pub async fn transition(
		&self,
		order_id: &str,
		to: OrderStatus,
		actor: &str,
		note: Option<String>,
	) -> Result<Order, OrderStateError> {
		self.transition_with(order_id, to, actor, note, |_| Ok(()))
			.await
	}

	/// Moves an order to `to` and applies `f` in the same atomic write.
	///
	/// `f` runs after the transition has been validated and before the status
	/// changes; if it fails nothing is written.
	pub async fn transition_with<F>(
		&self,
		order_id: &str,
		to: OrderStatus,
		actor: &str,
		note: Option<String>,
		f: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order) -> Result<(), OrderStateError>,
	{
		let sla_config = &self.sla;
		let order = self
			.modify(order_id, move |order: &mut Order| {
				let from = order.status;
				if !is_valid_transition(from, to) {
					return Err(OrderStateError::InvalidTransition { from, to });
				}

				f(order)?;

				if from == OrderStatus::InternalReview && to == OrderStatus::Finalising {
					versions::lock_current(order)?;
				}

				let now = current_timestamp();
				let target = sla_config.target_hours_for(&order.tier);
				sla::apply_transition(&mut order.sla, from, to, now, target);

				order.status = to;
				order.updated_at = now;
				order.audit_trail.push(AuditEntry {
					at: now,
					from: Some(from),
					to,
					actor: actor.to_string(),
					note,
				});
				Ok(())
			})
			.await?;

		tracing::info!(
			order_id = %truncate_id(order_id),
			status = %to,
			actor = %actor,
			"Order status changed"
		);
		Ok(order)
	}

	/// Updates an order with a closure and persists it.
	pub async fn update_order_with<F>(
		&self,
		order_id: &str,
		updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order),
	{
		self.try_update_order(order_id, |order| {
			updater(order);
			Ok(())
		})
		.await
	}

	/// Like [`update_order_with`](Self::update_order_with) for updates that
	/// can refuse; nothing is written when `updater` fails.
	pub async fn try_update_order<F>(
		&self,
		order_id: &str,
		updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order) -> Result<(), OrderStateError>,
	{
		self.modify(order_id, |order: &mut Order| {
			updater(order)?;
			order.updated_at = current_timestamp();
			Ok(())
		})
		.await
	}

	async fn modify<F>(&self, order_id: &str, f: F) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order) -> Result<(), OrderStateError>,
	{
		self.storage
			.modify(StorageKey::Orders.as_str(), order_id, f)
			.await
			.map_err(|e| match e {
				OrderStateError::Storage(StorageError::NotFound) => {
					OrderStateError::OrderNotFound(order_id.to_string())
				},
				other => other,
			})
	}

	/// Gets an order by ID.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
				other => OrderStateError::Storage(other),
			})
	}

	/// Orders currently in `status`, oldest first.
	pub async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, OrderStateError> {
		self.list_matching(QueryFilter::Equals(
			"status".to_string(),
			serde_json::Value::from(status.as_str()),
		))
		.await
	}

	/// Orders in any of `statuses`, oldest first.
	pub async fn list_by_statuses(
		&self,
		statuses: &[OrderStatus],
	) -> Result<Vec<Order>, OrderStateError> {
		let values = statuses
			.iter()
			.map(|s| serde_json::Value::from(s.as_str()))
			.collect();
		self.list_matching(QueryFilter::In("status".to_string(), values))
			.await
	}

	async fn list_matching(&self, filter: QueryFilter) -> Result<Vec<Order>, OrderStateError> {
		let mut orders: Vec<Order> = self
			.storage
			.query(StorageKey::Orders.as_str(), filter)
			.await?
			.into_iter()
			.map(|(_, order)| order)
			.collect();
		orders.sort_by(|a: &Order, b: &Order| {
			a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
		});
		Ok(orders)
	}
}
