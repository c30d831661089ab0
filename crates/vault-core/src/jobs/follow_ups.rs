//! Sends scheduled lead-nurture emails.
//!
//! Follow-ups are marketing mail: an address on the suppression list gets
//! its follow-up cancelled instead of sent.

use super::{Job, JobError, JobReport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use vault_notify::{render_template, EmailMessage, NotificationService, SendOutcome};
use vault_storage::{QueryFilter, StorageError, StorageService};
use vault_types::{current_timestamp, truncate_id, FollowUpStatus, LeadFollowUp, StorageKey};

fn template(name: &str) -> (&'static str, &'static str) {
	match name {
		"abandoned_checkout" => (
			"Your compliance pack is waiting",
			"Hello,\n\nYou started an order with Compliance Vault Pro but did not finish \
			checkout. Your answers are saved; pick up where you left off from your \
			dashboard.\n\nReference: {{client_id}}\n",
		),
		"compliance_check_reminder" => (
			"Is your property still compliant?",
			"Hello,\n\nGas safety and EICR certificates expire quietly. Upload yours to \
			Compliance Vault Pro and we will track every renewal date for you.\n",
		),
		_ => (
			"Following up from Compliance Vault Pro",
			"Hello,\n\nThanks for your interest in Compliance Vault Pro. Reply to this \
			email if you have any questions about keeping your lettings compliant.\n",
		),
	}
}

pub(crate) fn follow_up_message(follow_up: &LeadFollowUp) -> EmailMessage {
	let (subject, body) = template(&follow_up.template);
	let vars = HashMap::from([
		("client_id".to_string(), follow_up.client_id.clone()),
		("email".to_string(), follow_up.email.clone()),
	]);
	EmailMessage::marketing(
		&follow_up.email,
		render_template(subject, &vars),
		render_template(body, &vars),
	)
	.with_tag(format!("lead-{}", follow_up.template))
}

pub struct LeadFollowUpJob {
	storage: Arc<StorageService>,
	notifications: Arc<NotificationService>,
	interval: Duration,
	batch_size: usize,
}

impl LeadFollowUpJob {
	pub fn new(
		storage: Arc<StorageService>,
		notifications: Arc<NotificationService>,
		interval: Duration,
		batch_size: usize,
	) -> Self {
		Self {
			storage,
			notifications,
			interval,
			batch_size,
		}
	}

	/// Moves a follow-up out of PENDING. Returns false when someone else
	/// (a consent withdrawal, another worker) already did.
	async fn settle(&self, id: &str, status: FollowUpStatus) -> Result<bool, StorageError> {
		let mut changed = false;
		self.storage
			.modify(
				StorageKey::LeadFollowUps.as_str(),
				id,
				|follow_up: &mut LeadFollowUp| {
					if follow_up.status == FollowUpStatus::Pending {
						follow_up.status = status;
						changed = true;
					}
					Ok::<(), StorageError>(())
				},
			)
			.await?;
		Ok(changed)
	}
}

#[async_trait]
impl Job for LeadFollowUpJob {
	fn name(&self) -> &'static str {
		"lead_follow_ups"
	}

	fn interval(&self) -> Duration {
		self.interval
	}

	async fn run_once(&self) -> Result<JobReport, JobError> {
		let mut report = JobReport::default();
		let now = current_timestamp();
		let pending: Vec<(String, LeadFollowUp)> = self
			.storage
			.query(
				StorageKey::LeadFollowUps.as_str(),
				QueryFilter::Equals("status".to_string(), serde_json::json!("PENDING")),
			)
			.await?;

		let due = pending
			.into_iter()
			.filter(|(_, f)| f.scheduled_at <= now)
			.take(self.batch_size);

		for (id, follow_up) in due {
			let outcome = match self.notifications.send(&follow_up_message(&follow_up)).await {
				Ok(outcome) => outcome,
				Err(e) => {
					tracing::warn!(follow_up_id = %truncate_id(&id), error = %e, "Follow-up email failed");
					report.failure();
					continue;
				},
			};
			let status = match outcome {
				SendOutcome::Sent => FollowUpStatus::Sent,
				SendOutcome::Suppressed => FollowUpStatus::Cancelled,
			};
			match self.settle(&id, status).await {
				Ok(true) if outcome == SendOutcome::Sent => report.success(),
				Ok(_) => report.skip(),
				Err(e) => {
					tracing::warn!(follow_up_id = %truncate_id(&id), error = %e, "Failed to record follow-up");
					report.failure();
				},
			}
		}
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::Harness;

	async fn schedule(harness: &Harness, id: &str, email: &str, at: u64) {
		let follow_up = LeadFollowUp {
			id: id.to_string(),
			client_id: format!("client-{id}"),
			email: email.to_string(),
			template: "abandoned_checkout".to_string(),
			scheduled_at: at,
			status: FollowUpStatus::Pending,
		};
		harness
			.storage
			.store(StorageKey::LeadFollowUps.as_str(), id, &follow_up)
			.await
			.unwrap();
	}

	async fn status(harness: &Harness, id: &str) -> FollowUpStatus {
		harness
			.storage
			.retrieve::<LeadFollowUp>(StorageKey::LeadFollowUps.as_str(), id)
			.await
			.unwrap()
			.status
	}

	#[tokio::test]
	async fn test_sends_due_and_cancels_suppressed() {
		let harness = Harness::new().await;
		let now = current_timestamp();
		schedule(&harness, "due", "lead@example.co.uk", now - 10).await;
		schedule(&harness, "later", "lead@example.co.uk", now + 3600).await;
		schedule(&harness, "opted-out", "gone@example.co.uk", now - 10).await;
		harness.notifications.suppress("gone@example.co.uk").await;

		let job = LeadFollowUpJob::new(
			harness.storage.clone(),
			harness.notifications.clone(),
			Duration::from_secs(60),
			10,
		);
		let report = job.run_once().await.unwrap();
		assert_eq!(report.succeeded, 1);
		assert_eq!(report.skipped, 1);

		assert_eq!(status(&harness, "due").await, FollowUpStatus::Sent);
		assert_eq!(status(&harness, "later").await, FollowUpStatus::Pending);
		assert_eq!(status(&harness, "opted-out").await, FollowUpStatus::Cancelled);

		let sent = harness.sent();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].subject, "Your compliance pack is waiting");
		assert!(sent[0].body.contains("client-due"));
	}
}
