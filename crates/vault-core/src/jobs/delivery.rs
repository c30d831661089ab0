//! Delivery of approved orders.

use super::{is_race, Job, JobError, JobReport};
use crate::handlers::DeliveryHandler;
use crate::state::OrderStateMachine;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use vault_types::{truncate_id, OrderStatus};

pub struct OrderDeliveryJob {
	state_machine: Arc<OrderStateMachine>,
	delivery: Arc<DeliveryHandler>,
	interval: Duration,
	batch_size: usize,
}

impl OrderDeliveryJob {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		delivery: Arc<DeliveryHandler>,
		interval: Duration,
		batch_size: usize,
	) -> Self {
		Self {
			state_machine,
			delivery,
			interval,
			batch_size,
		}
	}
}

#[async_trait]
impl Job for OrderDeliveryJob {
	fn name(&self) -> &'static str {
		"order_delivery"
	}

	fn interval(&self) -> Duration {
		self.interval
	}

	async fn run_once(&self) -> Result<JobReport, JobError> {
		let mut report = JobReport::default();
		let ready = self
			.state_machine
			.list_by_status(OrderStatus::Finalising)
			.await?;

		for order in ready.into_iter().take(self.batch_size) {
			match self.delivery.deliver(&order.id).await {
				Ok(_) => report.success(),
				Err(e) if is_race(&e) => report.skip(),
				Err(e) => {
					// Stays in FINALISING; picked up again next tick.
					tracing::warn!(order_id = %truncate_id(&order.id), error = %e, "Delivery failed");
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

	#[tokio::test]
	async fn test_delivers_and_retries_after_email_failure() {
		let harness = Harness::new().await;
		let order = harness.finalising_order().await;
		let job = OrderDeliveryJob::new(
			harness.state_machine.clone(),
			harness.delivery.clone(),
			Duration::from_secs(60),
			10,
		);

		harness.mailer.fail_next_sends(true);
		let report = job.run_once().await.unwrap();
		assert_eq!(report.failed, 1);

		harness.mailer.fail_next_sends(false);
		let report = job.run_once().await.unwrap();
		assert_eq!(report.succeeded, 1);
		let stored = harness.state_machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Completed);

		let report = job.run_once().await.unwrap();
		assert_eq!(report.processed, 0);
	}
}
