//! API types for the vault HTTP surface.

use crate::{DocumentVersion, Order, OrderStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of a staff or client action on an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderActionRequest {
	/// User performing the action.
	pub actor: String,
	#[serde(default)]
	pub note: Option<String>,
	/// Answers supplied with `submit-input`.
	#[serde(default)]
	pub inputs: serde_json::Map<String, serde_json::Value>,
}

/// Order view returned by the API. Document content is omitted. Like every
/// API body it uses snake_case field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
	pub id: String,
	pub status: OrderStatus,
	pub service_code: String,
	pub created_at: u64,
	pub updated_at: u64,
	pub sla_deadline: Option<u64>,
	pub sla_breached: bool,
	pub documents: Vec<DocumentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
	pub version: u32,
	pub filename: String,
	pub content_hash: String,
	pub locked: bool,
}

impl From<&DocumentVersion> for DocumentSummary {
	fn from(v: &DocumentVersion) -> Self {
		Self {
			version: v.version,
			filename: v.filename.clone(),
			content_hash: v.content_hash.clone(),
			locked: v.locked,
		}
	}
}

impl From<&Order> for OrderResponse {
	fn from(order: &Order) -> Self {
		Self {
			id: order.id.clone(),
			status: order.status,
			service_code: order.service_code.clone(),
			created_at: order.created_at,
			updated_at: order.updated_at,
			sla_deadline: order.sla.deadline(),
			sla_breached: order.sla.breached,
			documents: order.documents.iter().map(DocumentSummary::from).collect(),
		}
	}
}

/// Acknowledgement returned to the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
	pub received: bool,
	pub outcome: String,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Validation failure (400)
	BadRequest { error_type: String, message: String },
	/// Missing resource (404)
	NotFound { error_type: String, message: String },
	/// State conflict such as an invalid transition (409)
	Conflict { error_type: String, message: String },
	/// Business rule failure such as insufficient credits (422)
	UnprocessableEntity {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Unexpected failure (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	pub fn bad_request(error_type: &str, message: impl Into<String>) -> Self {
		APIError::BadRequest {
			error_type: error_type.to_string(),
			message: message.into(),
		}
	}

	pub fn not_found(error_type: &str, message: impl Into<String>) -> Self {
		APIError::NotFound {
			error_type: error_type.to_string(),
			message: message.into(),
		}
	}

	pub fn conflict(error_type: &str, message: impl Into<String>) -> Self {
		APIError::Conflict {
			error_type: error_type.to_string(),
			message: message.into(),
		}
	}

	pub fn internal(message: impl Into<String>) -> Self {
		APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".to_string(),
			message: message.into(),
		}
	}

	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::UnprocessableEntity { .. } => 422,
			APIError::InternalServerError { .. } => 500,
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message, details) = match self {
			APIError::BadRequest { error_type, message }
			| APIError::NotFound { error_type, message }
			| APIError::Conflict { error_type, message }
			| APIError::InternalServerError { error_type, message } => {
				(error_type, message, None)
			},
			APIError::UnprocessableEntity {
				error_type,
				message,
				details,
			} => (error_type, message, details.clone()),
		};
		ErrorResponse {
			error: error.clone(),
			message: message.clone(),
			details,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let response = self.to_error_response();
		write!(f, "{} ({}): {}", response.error, self.status_code(), response.message)
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status =
			StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_codes() {
		assert_eq!(APIError::bad_request("X", "m").status_code(), 400);
		assert_eq!(APIError::not_found("X", "m").status_code(), 404);
		assert_eq!(APIError::conflict("X", "m").status_code(), 409);
		assert_eq!(APIError::internal("m").status_code(), 500);
	}

	#[test]
	fn test_error_response_carries_details() {
		let err = APIError::UnprocessableEntity {
			error_type: "INSUFFICIENT_CREDITS".to_string(),
			message: "balance 1, required 3".to_string(),
			details: Some(serde_json::json!({"balance": 1, "required": 3})),
		};
		let body = err.to_error_response();
		assert_eq!(body.error, "INSUFFICIENT_CREDITS");
		assert_eq!(body.details.unwrap()["required"], 3);
	}
}
