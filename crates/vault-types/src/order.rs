//! Fulfilment order types.
//!
//! An order is a purchased service or document pack moving through a fixed
//! status lifecycle. The record embeds its generated document versions, the
//! SLA clock and an append-only audit trail, mirroring how the document store
//! keeps everything about one order in one document.

use crate::SlaTracking;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a fulfilment order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	/// Created but not yet paid.
	Draft,
	/// Payment confirmed by the payment provider.
	Paid,
	/// Waiting for the workflow automation job.
	Queued,
	/// Documents are being generated.
	InProgress,
	/// Generated documents await staff review.
	InternalReview,
	/// Reviewer asked for the documents to be generated again.
	RegenRequested,
	/// Fulfilment is blocked on information from the client.
	ClientInputRequired,
	/// Approved; waiting for delivery to the client.
	Finalising,
	/// Delivered to the client.
	Completed,
	/// Cancelled before completion.
	Cancelled,
	/// Retired from active views.
	Archived,
	/// Fulfilment failed; may be re-queued by staff.
	Failed,
}

impl OrderStatus {
	/// Returns the wire representation used in storage and the API.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Draft => "DRAFT",
			OrderStatus::Paid => "PAID",
			OrderStatus::Queued => "QUEUED",
			OrderStatus::InProgress => "IN_PROGRESS",
			OrderStatus::InternalReview => "INTERNAL_REVIEW",
			OrderStatus::RegenRequested => "REGEN_REQUESTED",
			OrderStatus::ClientInputRequired => "CLIENT_INPUT_REQUIRED",
			OrderStatus::Finalising => "FINALISING",
			OrderStatus::Completed => "COMPLETED",
			OrderStatus::Cancelled => "CANCELLED",
			OrderStatus::Archived => "ARCHIVED",
			OrderStatus::Failed => "FAILED",
		}
	}

	/// Returns an iterator over all statuses.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Draft,
			Self::Paid,
			Self::Queued,
			Self::InProgress,
			Self::InternalReview,
			Self::RegenRequested,
			Self::ClientInputRequired,
			Self::Finalising,
			Self::Completed,
			Self::Cancelled,
			Self::Archived,
			Self::Failed,
		]
		.into_iter()
	}

	/// Statuses in which the SLA clock is relevant.
	pub fn is_in_fulfilment(&self) -> bool {
		matches!(
			self,
			OrderStatus::Paid
				| OrderStatus::Queued
				| OrderStatus::InProgress
				| OrderStatus::InternalReview
				| OrderStatus::RegenRequested
				| OrderStatus::ClientInputRequired
				| OrderStatus::Finalising
		)
	}

	/// No transition leaves a terminal status.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Archived)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all()
			.find(|status| status.as_str().eq_ignore_ascii_case(s))
			.ok_or_else(|| format!("Unknown order status: {}", s))
	}
}

/// Lifecycle of a single generated document version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
	/// Latest generated version, not yet approved.
	Draft,
	/// Approved and locked for delivery.
	Final,
	/// Replaced by a later version.
	Superseded,
}

/// One generated version of an order's document pack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentVersion {
	/// 1-based version number, strictly increasing per order.
	pub version: u32,
	/// Document type the version was generated for.
	pub document_type: String,
	/// File name presented to the client.
	pub filename: String,
	/// Hex-encoded SHA-256 of the generated content.
	pub content_hash: String,
	/// Name of the generator backend that produced the content.
	pub generator: String,
	/// Timestamp when the version was generated.
	pub generated_at: u64,
	/// Current status of the version.
	pub status: VersionStatus,
	/// Locked versions can no longer be replaced.
	#[serde(default)]
	pub locked: bool,
	/// Generated content.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub content: String,
}

/// A single entry in an order's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
	/// Timestamp of the change.
	pub at: u64,
	/// Previous status, absent for the creation entry.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub from: Option<OrderStatus>,
	/// Status after the change.
	pub to: OrderStatus,
	/// Who performed the change (user id, `system:<job>` or `webhook`).
	pub actor: String,
	/// Free-form note.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

/// A fulfilment order as persisted in the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Tenant (landlord client) that placed the order.
	pub client_id: String,
	/// Delivery address for documents and status emails.
	pub client_email: String,
	/// Organization the order is billed to, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub organization_id: Option<String>,
	/// Purchased service, which also selects the document type.
	pub service_code: String,
	/// Service tier, used to pick the SLA target.
	pub tier: String,
	/// Current status.
	pub status: OrderStatus,
	/// Timestamp when this order was created.
	pub created_at: u64,
	/// Timestamp when this order was last updated.
	pub updated_at: u64,
	/// Generated document versions, oldest first.
	#[serde(default)]
	pub documents: Vec<DocumentVersion>,
	/// SLA clock.
	#[serde(default)]
	pub sla: SlaTracking,
	/// Status history, oldest first.
	#[serde(default)]
	pub audit_trail: Vec<AuditEntry>,
	/// Answers supplied by the client during intake or on request.
	#[serde(default)]
	pub client_inputs: serde_json::Map<String, serde_json::Value>,
	/// Payment provider reference once paid.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payment_reference: Option<String>,
	/// Reviewer notes attached to the last regeneration request.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub regen_notes: Option<String>,
	/// Reason for the last failure.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub failure_reason: Option<String>,
}

impl Order {
	/// Latest document version, if any.
	pub fn current_version(&self) -> Option<&DocumentVersion> {
		self.documents.iter().max_by_key(|v| v.version)
	}

	/// True once a version has been approved and locked.
	pub fn is_locked(&self) -> bool {
		self.documents.iter().any(|v| v.locked)
	}
}

/// Input for creating a new draft order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
	pub client_id: String,
	pub client_email: String,
	#[serde(default)]
	pub organization_id: Option<String>,
	pub service_code: String,
	#[serde(default = "default_tier")]
	pub tier: String,
	#[serde(default)]
	pub client_inputs: serde_json::Map<String, serde_json::Value>,
}

fn default_tier() -> String {
	"standard".to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_wire_format() {
		let json = serde_json::to_string(&OrderStatus::ClientInputRequired).unwrap();
		assert_eq!(json, "\"CLIENT_INPUT_REQUIRED\"");

		let parsed: OrderStatus = serde_json::from_str("\"INTERNAL_REVIEW\"").unwrap();
		assert_eq!(parsed, OrderStatus::InternalReview);
	}

	#[test]
	fn test_status_from_str_matches_as_str() {
		for status in OrderStatus::all() {
			assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
		}
		assert_eq!("queued".parse::<OrderStatus>().unwrap(), OrderStatus::Queued);
		assert!("SHIPPED".parse::<OrderStatus>().is_err());
	}

	#[test]
	fn test_fulfilment_statuses() {
		assert!(OrderStatus::Paid.is_in_fulfilment());
		assert!(OrderStatus::Finalising.is_in_fulfilment());
		assert!(!OrderStatus::Draft.is_in_fulfilment());
		assert!(!OrderStatus::Completed.is_in_fulfilment());
		assert!(OrderStatus::Archived.is_terminal());
		assert!(!OrderStatus::Failed.is_terminal());
	}
}
