//! Workflow automation: intake of paid orders and document generation.

use super::{is_race, Job, JobError, JobReport};
use crate::handlers::{FulfilmentHandler, HandlerError, WORKFLOW_ACTOR};
use crate::state::OrderStateMachine;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use vault_types::{truncate_id, OrderStatus};

pub struct WorkflowAutomationJob {
	state_machine: Arc<OrderStateMachine>,
	fulfilment: Arc<FulfilmentHandler>,
	interval: Duration,
	batch_size: usize,
}

impl WorkflowAutomationJob {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		fulfilment: Arc<FulfilmentHandler>,
		interval: Duration,
		batch_size: usize,
	) -> Self {
		Self {
			state_machine,
			fulfilment,
			interval,
			batch_size,
		}
	}

	/// PAID -> QUEUED.
	async fn intake(&self) -> Result<JobReport, JobError> {
		let mut report = JobReport::default();
		let paid = self.state_machine.list_by_status(OrderStatus::Paid).await?;
		for order in paid.into_iter().take(self.batch_size) {
			match self
				.state_machine
				.transition(&order.id, OrderStatus::Queued, WORKFLOW_ACTOR, None)
				.await
			{
				Ok(_) => report.success(),
				Err(e) => {
					let e: HandlerError = e.into();
					if is_race(&e) {
						report.skip();
					} else {
						tracing::warn!(order_id = %truncate_id(&order.id), error = %e, "Failed to queue order");
						report.failure();
					}
				},
			}
		}
		Ok(report)
	}

	/// QUEUED / REGEN_REQUESTED -> generation -> INTERNAL_REVIEW or FAILED.
	async fn generate(&self) -> Result<JobReport, JobError> {
		let mut report = JobReport::default();
		let ready = self
			.state_machine
			.list_by_statuses(&[OrderStatus::Queued, OrderStatus::RegenRequested])
			.await?;
		for order in ready.into_iter().take(self.batch_size) {
			match self.fulfilment.generate(&order.id).await {
				Ok(updated) if updated.status == OrderStatus::Failed => report.failure(),
				Ok(_) => report.success(),
				Err(e) if is_race(&e) => report.skip(),
				Err(e) => {
					tracing::error!(order_id = %truncate_id(&order.id), error = %e, "Fulfilment failed");
					report.failure();
				},
			}
		}
		Ok(report)
	}
}

#[async_trait]
impl Job for WorkflowAutomationJob {
	fn name(&self) -> &'static str {
		"workflow_automation"
	}

	fn interval(&self) -> Duration {
		self.interval
	}

	async fn run_once(&self) -> Result<JobReport, JobError> {
		let mut report = self.intake().await?;
		report.merge(self.generate().await?);
		Ok(report)
	}
}
