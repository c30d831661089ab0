//! Consent log and the cascade that follows a withdrawal.
//!
//! Every decision is appended to the event log; the per-client state
//! document is then updated in one atomic write. Withdrawing marketing
//! consent suppresses marketing email to the client and cancels their
//! pending lead follow-ups. Withdrawing data-processing consent withdraws
//! every category.

use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use vault_notify::NotificationService;
use vault_storage::{QueryFilter, StorageError, StorageService};
use vault_types::{
	current_timestamp, truncate_id, ConsentAction, ConsentCategory, ConsentEvent, ConsentState,
	FollowUpStatus, LeadFollowUp, StorageKey,
};

#[derive(Debug, Error)]
pub enum ConsentError {
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Client {0} has not granted marketing consent")]
	MarketingNotGranted(String),
}

pub struct ConsentService {
	storage: Arc<StorageService>,
	notifications: Arc<NotificationService>,
}

impl ConsentService {
	pub fn new(storage: Arc<StorageService>, notifications: Arc<NotificationService>) -> Self {
		Self {
			storage,
			notifications,
		}
	}

	/// Records a consent decision and applies its effects.
	#[instrument(skip_all, fields(client_id = %truncate_id(client_id), category = %category))]
	pub async fn record(
		&self,
		client_id: &str,
		email: &str,
		category: ConsentCategory,
		action: ConsentAction,
		source: &str,
	) -> Result<ConsentState, ConsentError> {
		let now = current_timestamp();
		let event = ConsentEvent {
			id: uuid::Uuid::new_v4().to_string(),
			client_id: client_id.to_string(),
			category,
			action,
			source: source.to_string(),
			at: now,
		};
		self.storage
			.insert_new(StorageKey::ConsentEvents.as_str(), &event.id, &event, None)
			.await?;

		let granted = action == ConsentAction::Granted;
		let withdraws_marketing = !granted
			&& matches!(
				category,
				ConsentCategory::Marketing | ConsentCategory::DataProcessing
			);
		let state = self
			.storage
			.upsert(
				StorageKey::ConsentStates.as_str(),
				client_id,
				|| ConsentState {
					client_id: client_id.to_string(),
					..Default::default()
				},
				|state: &mut ConsentState| {
					if !email.is_empty() {
						state.email = email.to_string();
					}
					if category == ConsentCategory::DataProcessing && !granted {
						for category in ConsentCategory::all() {
							state.set(category, false);
						}
					} else {
						state.set(category, granted);
					}
					if withdraws_marketing {
						state.marketing_suppressed = true;
					} else if granted && category == ConsentCategory::Marketing {
						state.marketing_suppressed = false;
					}
					state.updated_at = now;
					Ok::<(), StorageError>(())
				},
			)
			.await?;

		if withdraws_marketing && !state.email.is_empty() {
			self.notifications.suppress(&state.email).await;
			let cancelled = self.cancel_follow_ups(client_id).await?;
			tracing::info!(cancelled, "Marketing consent withdrawn");
		} else if state.marketing && category == ConsentCategory::Marketing {
			self.notifications.unsuppress(&state.email).await;
		}
		Ok(state)
	}

	pub async fn state(&self, client_id: &str) -> Result<Option<ConsentState>, ConsentError> {
		Ok(self
			.storage
			.find(StorageKey::ConsentStates.as_str(), client_id)
			.await?)
	}

	/// The client's consent log, oldest first.
	pub async fn events(&self, client_id: &str) -> Result<Vec<ConsentEvent>, ConsentError> {
		let mut events: Vec<ConsentEvent> = self
			.storage
			.query(
				StorageKey::ConsentEvents.as_str(),
				QueryFilter::Equals("client_id".to_string(), serde_json::json!(client_id)),
			)
			.await?
			.into_iter()
			.map(|(_, event)| event)
			.collect();
		events.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.id.cmp(&b.id)));
		Ok(events)
	}

	/// Schedules a lead-nurture email. Requires marketing consent.
	pub async fn schedule_follow_up(
		&self,
		client_id: &str,
		template: &str,
		scheduled_at: u64,
	) -> Result<LeadFollowUp, ConsentError> {
		let state = self
			.state(client_id)
			.await?
			.filter(|s| s.marketing && !s.email.is_empty())
			.ok_or_else(|| ConsentError::MarketingNotGranted(client_id.to_string()))?;

		let follow_up = LeadFollowUp {
			id: uuid::Uuid::new_v4().to_string(),
			client_id: client_id.to_string(),
			email: state.email,
			template: template.to_string(),
			scheduled_at,
			status: FollowUpStatus::Pending,
		};
		self.storage
			.insert_new(
				StorageKey::LeadFollowUps.as_str(),
				&follow_up.id,
				&follow_up,
				None,
			)
			.await?;
		Ok(follow_up)
	}

	/// Cancels every pending follow-up for the client.
	pub async fn cancel_follow_ups(&self, client_id: &str) -> Result<usize, ConsentError> {
		let pending: Vec<(String, LeadFollowUp)> = self
			.storage
			.query(
				StorageKey::LeadFollowUps.as_str(),
				QueryFilter::Equals("client_id".to_string(), serde_json::json!(client_id)),
			)
			.await?;

		let mut cancelled = 0;
		for (id, follow_up) in pending {
			if follow_up.status != FollowUpStatus::Pending {
				continue;
			}
			self.storage
				.modify(
					StorageKey::LeadFollowUps.as_str(),
					&id,
					|f: &mut LeadFollowUp| {
						if f.status == FollowUpStatus::Pending {
							f.status = FollowUpStatus::Cancelled;
							cancelled += 1;
						}
						Ok::<(), StorageError>(())
					},
				)
				.await?;
		}
		Ok(cancelled)
	}

	/// Addresses whose marketing consent was withdrawn, for rebuilding the
	/// suppression list at startup.
	pub async fn suppressed_emails(&self) -> Result<Vec<String>, ConsentError> {
		let states: Vec<(String, ConsentState)> = self
			.storage
			.query(
				StorageKey::ConsentStates.as_str(),
				QueryFilter::Equals(
					"marketing_suppressed".to_string(),
					serde_json::json!(true),
				),
			)
			.await?;
		Ok(states
			.into_iter()
			.map(|(_, state)| state.email)
			.filter(|email| !email.is_empty())
			.collect())
	}
}
