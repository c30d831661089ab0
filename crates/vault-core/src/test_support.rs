//! Fixtures shared by the unit tests in this crate.

use crate::handlers::{DeliveryHandler, FulfilmentHandler, OrderActions};
use crate::state::OrderStateMachine;
use async_trait::async_trait;
use mockall::mock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use vault_config::SlaConfig;
use vault_documents::implementations::template::TemplateGenerator;
use vault_documents::{
	DocumentError, DocumentInterface, DocumentService, GeneratedDocument, GenerationRequest,
};
use vault_notify::{EmailMessage, NotificationError, NotificationInterface, NotificationService};
use vault_storage::implementations::memory::MemoryStorage;
use vault_storage::StorageService;
use vault_types::{ConfigSchema, NewOrder, Order, OrderStatus, Schema, ValidationError};

mock! {
	pub Docs {}

	#[async_trait]
	impl DocumentInterface for Docs {
		fn config_schema(&self) -> Box<dyn ConfigSchema>;
		async fn generate(
			&self,
			request: &GenerationRequest,
		) -> Result<GeneratedDocument, DocumentError>;
	}
}

struct NoSchema;

impl ConfigSchema for NoSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Notification backend that records messages and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingMailer {
	sent: Arc<Mutex<Vec<EmailMessage>>>,
	failing: Arc<AtomicBool>,
}

impl RecordingMailer {
	pub fn fail_next_sends(&self, fail: bool) {
		self.failing.store(fail, Ordering::SeqCst);
	}

	pub fn sent(&self) -> Vec<EmailMessage> {
		self.sent.lock().unwrap().clone()
	}
}

#[async_trait]
impl NotificationInterface for RecordingMailer {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoSchema)
	}

	async fn send(&self, _from: &str, message: &EmailMessage) -> Result<(), NotificationError> {
		if self.failing.load(Ordering::SeqCst) {
			return Err(NotificationError::Delivery("mailbox unavailable".into()));
		}
		self.sent.lock().unwrap().push(message.clone());
		Ok(())
	}
}

pub struct Harness {
	pub storage: Arc<StorageService>,
	pub state_machine: Arc<OrderStateMachine>,
	pub documents: Arc<DocumentService>,
	pub notifications: Arc<NotificationService>,
	pub fulfilment: Arc<FulfilmentHandler>,
	pub delivery: Arc<DeliveryHandler>,
	pub actions: OrderActions,
	pub mailer: RecordingMailer,
}

impl Harness {
	pub async fn new() -> Self {
		Self::build(Box::new(TemplateGenerator::with_builtin()))
	}

	pub async fn with_documents(docs: MockDocs) -> Self {
		Self::build(Box::new(docs))
	}

	fn build(generator: Box<dyn DocumentInterface>) -> Self {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let state_machine = Arc::new(OrderStateMachine::new(
			storage.clone(),
			SlaConfig::default(),
		));
		let documents = Arc::new(DocumentService::new(generator));
		let mailer = RecordingMailer::default();
		let notifications = Arc::new(NotificationService::new(
			Box::new(mailer.clone()),
			"orders@example.co.uk",
			"ops@example.co.uk",
		));

		Self {
			fulfilment: Arc::new(FulfilmentHandler::new(
				state_machine.clone(),
				documents.clone(),
				notifications.clone(),
			)),
			delivery: Arc::new(DeliveryHandler::new(
				state_machine.clone(),
				notifications.clone(),
			)),
			actions: OrderActions::new(state_machine.clone(), notifications.clone()),
			storage,
			state_machine,
			documents,
			notifications,
			mailer,
		}
	}

	pub async fn draft_order(&self) -> Order {
		let new_order = NewOrder {
			client_id: "client-1".to_string(),
			client_email: "client@example.co.uk".to_string(),
			organization_id: None,
			service_code: "compliance_pack".to_string(),
			tier: "standard".to_string(),
			client_inputs: serde_json::Map::new(),
		};
		self.state_machine
			.create_order(new_order, "client-1")
			.await
			.unwrap()
	}

	pub async fn queued_order(&self) -> Order {
		let order = self.draft_order().await;
		for status in [OrderStatus::Paid, OrderStatus::Queued] {
			self.state_machine
				.transition(&order.id, status, "system", None)
				.await
				.unwrap();
		}
		self.state_machine.get_order(&order.id).await.unwrap()
	}

	pub async fn finalising_order(&self) -> Order {
		let order = self.queued_order().await;
		self.fulfilment.generate(&order.id).await.unwrap();
		self.actions
			.approve(&order.id, "staff-1", None)
			.await
			.unwrap()
	}

	pub fn sent(&self) -> Vec<EmailMessage> {
		self.mailer.sent()
	}
}
