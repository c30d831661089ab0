//! Vault engine: owns the services and drives the background jobs.
//!
//! The engine wires the order state machine, fulfilment handlers, credit
//! ledger, consent and organization services around one storage backend,
//! one document generator and one mailer. `run` restores state that lives
//! in memory (the marketing suppression list), starts the job scheduler and
//! stops it on Ctrl+C.

use crate::clearform::ClearFormService;
use crate::compliance::ComplianceService;
use crate::consent::ConsentService;
use crate::credits::CreditLedger;
use crate::handlers::{DeliveryHandler, FulfilmentHandler, OrderActions};
use crate::jobs::{
	LeadFollowUpJob, OrderDeliveryJob, Scheduler, SlaMonitorJob, StorageCleanupJob,
	WorkflowAutomationJob,
};
use crate::organizations::OrganizationService;
use crate::state::OrderStateMachine;
use crate::webhooks::WebhookDispatcher;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use vault_config::Config;
use vault_documents::DocumentService;
use vault_notify::NotificationService;
use vault_storage::StorageService;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

#[derive(Clone)]
pub struct VaultEngine {
	config: Config,
	storage: Arc<StorageService>,
	notifications: Arc<NotificationService>,
	state_machine: Arc<OrderStateMachine>,
	fulfilment: Arc<FulfilmentHandler>,
	delivery: Arc<DeliveryHandler>,
	actions: Arc<OrderActions>,
	ledger: Arc<CreditLedger>,
	clearform: Arc<ClearFormService>,
	consent: Arc<ConsentService>,
	organizations: Arc<OrganizationService>,
	compliance: Arc<ComplianceService>,
	webhooks: Arc<WebhookDispatcher>,
}

impl VaultEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		documents: Arc<DocumentService>,
		notifications: Arc<NotificationService>,
	) -> Self {
		let state_machine = Arc::new(OrderStateMachine::new(
			storage.clone(),
			config.sla.clone(),
		));
		let fulfilment = Arc::new(FulfilmentHandler::new(
			state_machine.clone(),
			documents.clone(),
			notifications.clone(),
		));
		let delivery = Arc::new(DeliveryHandler::new(
			state_machine.clone(),
			notifications.clone(),
		));
		let actions = Arc::new(OrderActions::new(
			state_machine.clone(),
			notifications.clone(),
		));
		let ledger = Arc::new(CreditLedger::new(storage.clone()));
		let clearform = Arc::new(ClearFormService::new(
			storage.clone(),
			ledger.clone(),
			documents,
			config.credits.clone(),
		));
		let consent = Arc::new(ConsentService::new(storage.clone(), notifications.clone()));
		let organizations = Arc::new(OrganizationService::new(storage.clone()));
		let compliance = Arc::new(ComplianceService::new(
			storage.clone(),
			config.compliance.clone(),
		));
		let webhooks = Arc::new(WebhookDispatcher::new(
			storage.clone(),
			actions.clone(),
			ledger.clone(),
			config.credits.packs.clone(),
			config.webhook.clone(),
		));

		Self {
			config,
			storage,
			notifications,
			state_machine,
			fulfilment,
			delivery,
			actions,
			ledger,
			clearform,
			consent,
			organizations,
			compliance,
			webhooks,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn state_machine(&self) -> &Arc<OrderStateMachine> {
		&self.state_machine
	}

	pub fn fulfilment(&self) -> &Arc<FulfilmentHandler> {
		&self.fulfilment
	}

	pub fn actions(&self) -> &Arc<OrderActions> {
		&self.actions
	}

	pub fn ledger(&self) -> &Arc<CreditLedger> {
		&self.ledger
	}

	pub fn clearform(&self) -> &Arc<ClearFormService> {
		&self.clearform
	}

	pub fn consent(&self) -> &Arc<ConsentService> {
		&self.consent
	}

	pub fn organizations(&self) -> &Arc<OrganizationService> {
		&self.organizations
	}

	pub fn compliance(&self) -> &Arc<ComplianceService> {
		&self.compliance
	}

	pub fn webhooks(&self) -> &Arc<WebhookDispatcher> {
		&self.webhooks
	}

	/// Scheduler with every background job registered at its configured
	/// interval.
	pub fn scheduler(&self) -> Scheduler {
		let jobs = &self.config.jobs;
		let mut scheduler = Scheduler::new();
		scheduler
			.register(Arc::new(WorkflowAutomationJob::new(
				self.state_machine.clone(),
				self.fulfilment.clone(),
				Duration::from_secs(jobs.workflow_interval_seconds),
				jobs.batch_size,
			)))
			.register(Arc::new(OrderDeliveryJob::new(
				self.state_machine.clone(),
				self.delivery.clone(),
				Duration::from_secs(jobs.delivery_interval_seconds),
				jobs.batch_size,
			)))
			.register(Arc::new(SlaMonitorJob::new(
				self.state_machine.clone(),
				self.notifications.clone(),
				self.config.sla.warning_threshold_percent,
				Duration::from_secs(jobs.sla_interval_seconds),
			)))
			.register(Arc::new(LeadFollowUpJob::new(
				self.storage.clone(),
				self.notifications.clone(),
				Duration::from_secs(jobs.workflow_interval_seconds),
				jobs.batch_size,
			)))
			.register(Arc::new(StorageCleanupJob::new(
				self.storage.clone(),
				Duration::from_secs(self.config.storage.cleanup_interval_seconds),
			)));
		scheduler
	}

	/// Rebuilds in-memory state from storage.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		let suppressed = self
			.consent
			.suppressed_emails()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		let count = suppressed.len();
		self.notifications.suppress_all(suppressed).await;
		tracing::info!(suppressed = count, "Restored marketing suppression list");
		Ok(())
	}

	/// Runs the background jobs until Ctrl+C.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.initialize().await?;

		let scheduler = self.scheduler();
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let handles = scheduler.start(shutdown_rx);
		tracing::info!(jobs = ?scheduler.job_names(), "Vault engine running");

		tokio::signal::ctrl_c()
			.await
			.map_err(|e| EngineError::Service(format!("Failed to listen for shutdown: {}", e)))?;
		tracing::info!("Shutdown signal received");

		// Receivers may already be gone if every job exited.
		let _ = shutdown_tx.send(true);
		for handle in handles {
			if let Err(e) = handle.await {
				tracing::warn!(error = %e, "Job task ended abnormally");
			}
		}
		Ok(())
	}
}
