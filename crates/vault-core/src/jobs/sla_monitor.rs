//! SLA monitor: warns operations as orders approach their deadline and
//! flags breaches.

use super::{Job, JobError, JobReport};
use crate::sla::{self, SlaAlert};
use crate::state::OrderStateMachine;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use vault_notify::NotificationService;
use vault_types::{current_timestamp, truncate_id, Order, OrderStatus};

pub struct SlaMonitorJob {
	state_machine: Arc<OrderStateMachine>,
	notifications: Arc<NotificationService>,
	warning_threshold_percent: u8,
	interval: Duration,
}

impl SlaMonitorJob {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		notifications: Arc<NotificationService>,
		warning_threshold_percent: u8,
		interval: Duration,
	) -> Self {
		Self {
			state_machine,
			notifications,
			warning_threshold_percent,
			interval,
		}
	}

	/// Sets the alert flag inside an atomic update and reports whether this
	/// call was the one that raised it.
	async fn raise(&self, order: &Order, now: u64) -> Result<Option<SlaAlert>, JobError> {
		let threshold = self.warning_threshold_percent;
		let mut raised = None;
		self.state_machine
			.update_order_with(&order.id, |order| {
				if let Some(alert) = sla::evaluate(&order.sla, now, threshold) {
					sla::mark(&mut order.sla, alert);
					raised = Some(alert);
				}
			})
			.await?;
		Ok(raised)
	}

	async fn alert(&self, order: &Order, alert: SlaAlert) {
		let deadline = order.sla.deadline().unwrap_or_default();
		let (subject, verb) = match alert {
			SlaAlert::Warning => ("SLA warning", "is approaching"),
			SlaAlert::Breached => ("SLA breached", "has passed"),
		};
		let body = format!(
			"Order {} ({}, tier {}) in status {}: the SLA deadline {} (unix {}).",
			order.id, order.service_code, order.tier, order.status, verb, deadline
		);
		if let Err(e) = self
			.notifications
			.notify_operations(format!("{}: order {}", subject, truncate_id(&order.id)), body)
			.await
		{
			tracing::warn!(order_id = %truncate_id(&order.id), error = %e, "Failed to send SLA alert");
		}
	}
}

#[async_trait]
impl Job for SlaMonitorJob {
	fn name(&self) -> &'static str {
		"sla_monitor"
	}

	fn interval(&self) -> Duration {
		self.interval
	}

	async fn run_once(&self) -> Result<JobReport, JobError> {
		let mut report = JobReport::default();
		let active: Vec<OrderStatus> = OrderStatus::all()
			.filter(|s| s.is_in_fulfilment())
			.collect();
		let orders = self.state_machine.list_by_statuses(&active).await?;
		let now = current_timestamp();

		for order in orders {
			if sla::evaluate(&order.sla, now, self.warning_threshold_percent).is_none() {
				continue;
			}
			match self.raise(&order, now).await {
				Ok(Some(alert)) => {
					match alert {
						SlaAlert::Warning => {
							tracing::warn!(order_id = %truncate_id(&order.id), "SLA warning threshold reached")
						},
						SlaAlert::Breached => {
							tracing::error!(order_id = %truncate_id(&order.id), "SLA breached")
						},
					}
					self.alert(&order, alert).await;
					report.success();
				},
				Ok(None) => report.skip(),
				Err(e) => {
					tracing::warn!(order_id = %truncate_id(&order.id), error = %e, "SLA check failed");
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

	const HOUR: u64 = 3600;

	fn job(harness: &Harness) -> SlaMonitorJob {
		SlaMonitorJob::new(
			harness.state_machine.clone(),
			harness.notifications.clone(),
			75,
			Duration::from_secs(300),
		)
	}

	async fn backdate(harness: &Harness, id: &str, hours: u64) {
		harness
			.state_machine
			.update_order_with(id, |o| {
				o.sla.started_at = Some(current_timestamp() - hours * HOUR);
			})
			.await
			.unwrap();
	}

	fn ops_alerts(harness: &Harness) -> Vec<String> {
		harness
			.sent()
			.into_iter()
			.filter(|m| m.to == "ops@example.co.uk")
			.map(|m| m.subject)
			.collect()
	}

	#[tokio::test]
	async fn test_warning_then_breach_each_sent_once() {
		let harness = Harness::new().await;
		let order = harness.queued_order().await;
		let job = job(&harness);

		assert_eq!(job.run_once().await.unwrap().processed, 0);

		backdate(&harness, &order.id, 40).await;
		assert_eq!(job.run_once().await.unwrap().succeeded, 1);
		assert_eq!(job.run_once().await.unwrap().processed, 0);

		backdate(&harness, &order.id, 50).await;
		assert_eq!(job.run_once().await.unwrap().succeeded, 1);
		assert_eq!(job.run_once().await.unwrap().processed, 0);

		let alerts = ops_alerts(&harness);
		assert_eq!(alerts.len(), 2);
		assert!(alerts[0].starts_with("SLA warning"));
		assert!(alerts[1].starts_with("SLA breached"));

		let stored = harness.state_machine.get_order(&order.id).await.unwrap();
		assert!(stored.sla.breached);
	}

	#[tokio::test]
	async fn test_paused_orders_are_not_alerted() {
		let harness = Harness::new().await;
		let order = harness.queued_order().await;
		harness
			.state_machine
			.transition(&order.id, OrderStatus::InProgress, "system", None)
			.await
			.unwrap();
		harness
			.actions
			.request_client_input(&order.id, "staff-1", "need floor plan")
			.await
			.unwrap();
		backdate(&harness, &order.id, 100).await;

		assert_eq!(job(&harness).run_once().await.unwrap().processed, 0);
		assert!(ops_alerts(&harness).is_empty());
	}
}
