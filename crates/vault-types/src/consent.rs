//! Consent event log and derived per-client state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category a consent decision applies to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentCategory {
	Marketing,
	Analytics,
	Functional,
	/// Umbrella consent; withdrawing it withdraws every category.
	DataProcessing,
}

impl ConsentCategory {
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Marketing,
			Self::Analytics,
			Self::Functional,
			Self::DataProcessing,
		]
		.into_iter()
	}
}

impl fmt::Display for ConsentCategory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ConsentCategory::Marketing => "MARKETING",
			ConsentCategory::Analytics => "ANALYTICS",
			ConsentCategory::Functional => "FUNCTIONAL",
			ConsentCategory::DataProcessing => "DATA_PROCESSING",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentAction {
	Granted,
	Withdrawn,
}

/// Append-only record of a consent decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentEvent {
	pub id: String,
	pub client_id: String,
	pub category: ConsentCategory,
	pub action: ConsentAction,
	/// Where the decision was captured (signup form, preference centre, ...).
	pub source: String,
	pub at: u64,
}

/// Current consent flags for a client, derived from the event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentState {
	pub client_id: String,
	pub email: String,
	pub marketing: bool,
	pub analytics: bool,
	pub functional: bool,
	pub data_processing: bool,
	/// Set by a marketing (or data-processing) withdrawal and cleared by a
	/// new marketing grant. Never having granted marketing does not set it.
	#[serde(default)]
	pub marketing_suppressed: bool,
	pub updated_at: u64,
}

impl ConsentState {
	pub fn is_granted(&self, category: ConsentCategory) -> bool {
		match category {
			ConsentCategory::Marketing => self.marketing,
			ConsentCategory::Analytics => self.analytics,
			ConsentCategory::Functional => self.functional,
			ConsentCategory::DataProcessing => self.data_processing,
		}
	}

	pub fn set(&mut self, category: ConsentCategory, granted: bool) {
		match category {
			ConsentCategory::Marketing => self.marketing = granted,
			ConsentCategory::Analytics => self.analytics = granted,
			ConsentCategory::Functional => self.functional = granted,
			ConsentCategory::DataProcessing => self.data_processing = granted,
		}
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FollowUpStatus {
	Pending,
	Sent,
	Cancelled,
}

/// Scheduled lead-nurture email for a prospective client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeadFollowUp {
	pub id: String,
	pub client_id: String,
	pub email: String,
	pub template: String,
	pub scheduled_at: u64,
	pub status: FollowUpStatus,
}
