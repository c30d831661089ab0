//! ClearForm document records.
//!
//! ClearForm shares the deployment with the vault but keeps its own
//! namespaces; its documents are paid for with credits instead of orders.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClearFormStatus {
	Pending,
	Generated,
	Failed,
}

/// A document generated for a ClearForm user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearFormDocument {
	pub id: String,
	pub user_id: String,
	pub document_type: String,
	pub status: ClearFormStatus,
	/// Credits deducted for this document; refunded when generation fails.
	pub credits_charged: u64,
	#[serde(default)]
	pub refunded: bool,
	/// What the user asked for, passed to the generator.
	pub intent: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content_hash: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub created_at: u64,
}
