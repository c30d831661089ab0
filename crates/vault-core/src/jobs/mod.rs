//! Background jobs and the scheduler that drives them.
//!
//! Every job is a poller: each tick it reads the orders (or other records)
//! it is responsible for and pushes them one step forward. A failure on one
//! item is logged and counted; the rest of the batch still runs.

pub mod cleanup;
pub mod delivery;
pub mod follow_ups;
pub mod sla_monitor;
pub mod workflow;

pub use cleanup::StorageCleanupJob;
pub use delivery::OrderDeliveryJob;
pub use follow_ups::LeadFollowUpJob;
pub use sla_monitor::SlaMonitorJob;
pub use workflow::WorkflowAutomationJob;

use crate::handlers::HandlerError;
use crate::state::OrderStateError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use vault_storage::StorageError;

/// Errors that abort a whole job run.
#[derive(Debug, Error)]
pub enum JobError {
	#[error("State error: {0}")]
	State(#[from] OrderStateError),
	#[error("Handler error: {0}")]
	Handler(#[from] HandlerError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Counts for one run of a job.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobReport {
	pub processed: usize,
	pub succeeded: usize,
	pub failed: usize,
	/// Items another worker moved first, or that no longer qualified.
	pub skipped: usize,
}

impl JobReport {
	pub fn success(&mut self) {
		self.processed += 1;
		self.succeeded += 1;
	}

	pub fn failure(&mut self) {
		self.processed += 1;
		self.failed += 1;
	}

	pub fn skip(&mut self) {
		self.processed += 1;
		self.skipped += 1;
	}

	pub fn merge(&mut self, other: JobReport) {
		self.processed += other.processed;
		self.succeeded += other.succeeded;
		self.failed += other.failed;
		self.skipped += other.skipped;
	}
}

#[async_trait]
pub trait Job: Send + Sync {
	fn name(&self) -> &'static str;

	fn interval(&self) -> Duration;

	async fn run_once(&self) -> Result<JobReport, JobError>;
}

/// Runs registered jobs on their own intervals until shutdown is signalled.
#[derive(Default)]
pub struct Scheduler {
	jobs: Vec<Arc<dyn Job>>,
}

impl Scheduler {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, job: Arc<dyn Job>) -> &mut Self {
		self.jobs.push(job);
		self
	}

	pub fn job_names(&self) -> Vec<&'static str> {
		self.jobs.iter().map(|job| job.name()).collect()
	}

	/// Spawns one task per job. Each task awaits its own run before the next
	/// tick, so a job never overlaps itself; ticks missed meanwhile are
	/// dropped.
	pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
		self.jobs
			.iter()
			.cloned()
			.map(|job| tokio::spawn(run_job(job, shutdown.clone())))
			.collect()
	}
}

async fn run_job(job: Arc<dyn Job>, mut shutdown: watch::Receiver<bool>) {
	let mut interval = tokio::time::interval(job.interval());
	interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
	tracing::info!(job = job.name(), interval_secs = job.interval().as_secs(), "Job started");

	loop {
		tokio::select! {
			_ = interval.tick() => {
				match job.run_once().await {
					Ok(report) if report.processed > 0 => {
						tracing::info!(
							job = job.name(),
							processed = report.processed,
							succeeded = report.succeeded,
							failed = report.failed,
							skipped = report.skipped,
							"Job run finished"
						);
					},
					Ok(_) => {},
					Err(e) => {
						tracing::error!(job = job.name(), error = %e, "Job run failed");
					},
				}
			}
			changed = shutdown.changed() => {
				if changed.is_err() || *shutdown.borrow() {
					break;
				}
			}
		}
	}
	tracing::info!(job = job.name(), "Job stopped");
}

/// True when the order's status moved under us; counted as a skip.
pub(crate) fn is_race(error: &HandlerError) -> bool {
	matches!(
		error,
		HandlerError::State(OrderStateError::InvalidTransition { .. })
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct Counter {
		runs: AtomicUsize,
	}

	#[async_trait]
	impl Job for Counter {
		fn name(&self) -> &'static str {
			"counter"
		}

		fn interval(&self) -> Duration {
			Duration::from_millis(10)
		}

		async fn run_once(&self) -> Result<JobReport, JobError> {
			self.runs.fetch_add(1, Ordering::SeqCst);
			let mut report = JobReport::default();
			report.success();
			Ok(report)
		}
	}

	#[tokio::test]
	async fn test_scheduler_runs_until_shutdown() {
		let job = Arc::new(Counter {
			runs: AtomicUsize::new(0),
		});
		let mut scheduler = Scheduler::new();
		scheduler.register(job.clone());
		assert_eq!(scheduler.job_names(), vec!["counter"]);

		let (tx, rx) = watch::channel(false);
		let handles = scheduler.start(rx);
		tokio::time::sleep(Duration::from_millis(60)).await;
		tx.send(true).unwrap();
		for handle in handles {
			handle.await.unwrap();
		}

		let runs = job.runs.load(Ordering::SeqCst);
		assert!(runs >= 2, "expected several runs, got {runs}");
		tokio::time::sleep(Duration::from_millis(30)).await;
		assert_eq!(job.runs.load(Ordering::SeqCst), runs);
	}

	#[test]
	fn test_report_merge() {
		let mut a = JobReport::default();
		a.success();
		a.skip();
		let mut b = JobReport::default();
		b.failure();
		a.merge(b);
		assert_eq!(
			a,
			JobReport {
				processed: 3,
				succeeded: 1,
				failed: 1,
				skipped: 1
			}
		);
	}
}
