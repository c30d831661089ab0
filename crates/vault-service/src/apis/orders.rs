//! Order read and staff/client action endpoints.

use std::str::FromStr;
use vault_core::{HandlerError, OrderStateError, VaultEngine};
use vault_types::{truncate_id, APIError, OrderActionRequest, OrderResponse};

/// Actions accepted on `POST /api/orders/{id}/actions/{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
	MarkPaid,
	Approve,
	RequestRegeneration,
	RequestInput,
	SubmitInput,
	Cancel,
	Retry,
	Archive,
}

impl FromStr for OrderAction {
	type Err = APIError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"mark-paid" => Ok(Self::MarkPaid),
			"approve" => Ok(Self::Approve),
			"request-regeneration" => Ok(Self::RequestRegeneration),
			"request-input" => Ok(Self::RequestInput),
			"submit-input" => Ok(Self::SubmitInput),
			"cancel" => Ok(Self::Cancel),
			"retry" => Ok(Self::Retry),
			"archive" => Ok(Self::Archive),
			other => Err(APIError::bad_request(
				"UNKNOWN_ACTION",
				format!("Unknown order action: {}", other),
			)),
		}
	}
}

pub fn state_error(e: OrderStateError) -> APIError {
	match e {
		OrderStateError::OrderNotFound(id) => {
			APIError::not_found("ORDER_NOT_FOUND", format!("Order not found: {}", id))
		},
		e @ OrderStateError::InvalidTransition { .. } => {
			APIError::conflict("INVALID_TRANSITION", e.to_string())
		},
		e @ OrderStateError::VersionLocked(_) => APIError::conflict("VERSION_LOCKED", e.to_string()),
		e @ OrderStateError::NoDocuments(_) => APIError::conflict("NO_DOCUMENTS", e.to_string()),
		OrderStateError::Storage(e) => APIError::internal(e.to_string()),
	}
}

pub fn handler_error(e: HandlerError) -> APIError {
	match e {
		HandlerError::State(e) => state_error(e),
		HandlerError::Notification(message) => APIError::internal(message),
	}
}

pub async fn get_order(id: &str, engine: &VaultEngine) -> Result<OrderResponse, APIError> {
	let order = engine
		.state_machine()
		.get_order(id)
		.await
		.map_err(state_error)?;
	Ok(OrderResponse::from(&order))
}

fn required_note(request: &OrderActionRequest, what: &str) -> Result<String, APIError> {
	match request.note.as_deref().map(str::trim) {
		Some(note) if !note.is_empty() => Ok(note.to_string()),
		_ => Err(APIError::bad_request(
			"MISSING_NOTE",
			format!("A note is required: {}", what),
		)),
	}
}

/// Applies one action on behalf of `request.actor`.
pub async fn perform_action(
	id: &str,
	action: &str,
	request: OrderActionRequest,
	engine: &VaultEngine,
) -> Result<OrderResponse, APIError> {
	let action = OrderAction::from_str(action)?;
	let actor = request.actor.trim();
	if actor.is_empty() {
		return Err(APIError::bad_request("MISSING_ACTOR", "actor is required"));
	}
	tracing::info!(order_id = %truncate_id(id), ?action, actor, "Order action requested");

	let actions = engine.actions();
	let order = match action {
		OrderAction::MarkPaid => {
			let reference = required_note(&request, "payment reference")?;
			actions.mark_paid(id, &reference, actor).await
		},
		OrderAction::Approve => actions.approve(id, actor, request.note.clone()).await,
		OrderAction::RequestRegeneration => {
			let notes = required_note(&request, "regeneration notes")?;
			actions.request_regeneration(id, actor, &notes).await
		},
		OrderAction::RequestInput => {
			let question = required_note(&request, "question for the client")?;
			actions.request_client_input(id, actor, &question).await
		},
		OrderAction::SubmitInput => {
			if request.inputs.is_empty() {
				return Err(APIError::bad_request("MISSING_INPUTS", "inputs cannot be empty"));
			}
			actions.submit_client_input(id, actor, request.inputs.clone()).await
		},
		OrderAction::Cancel => actions.cancel(id, actor, request.note.clone()).await,
		OrderAction::Retry => actions.retry(id, actor).await,
		OrderAction::Archive => actions.archive(id, actor).await,
	}
	.map_err(handler_error)?;

	Ok(OrderResponse::from(&order))
}
