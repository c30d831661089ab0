//! Payment provider webhooks.
//!
//! Events arrive signed with a `t=<unix>,v1=<hex>` header where each `v1`
//! is HMAC-SHA256 over `"<t>.<raw body>"`. Verified events are processed at
//! most once, keyed by event id. The provider always gets an
//! acknowledgement; problems are reported in its `outcome` and the logs.

use crate::credits::{CreditError, CreditLedger};
use crate::handlers::{HandlerError, OrderActions, WEBHOOK_ACTOR};
use crate::state::OrderStateError;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use vault_config::WebhookConfig;
use vault_storage::{StorageError, StorageService};
use vault_types::{current_timestamp, truncate_id, StorageKey, WebhookAck};

type HmacSha256 = Hmac<Sha256>;

/// How long processed event ids are remembered.
const EVENT_RETENTION: Duration = Duration::from_secs(30 * 24 * 3600);

#[derive(Debug, Error)]
pub enum WebhookError {
	#[error("Malformed signature header")]
	MalformedHeader,
	#[error("Signature timestamp outside tolerance")]
	TimestampOutOfTolerance,
	#[error("Signature mismatch")]
	SignatureMismatch,
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Handler error: {0}")]
	Handler(#[from] HandlerError),
	#[error(transparent)]
	Credits(#[from] CreditError),
}

fn mac_for(secret: &str, timestamp: u64, payload: &[u8]) -> Result<HmacSha256, WebhookError> {
	let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
		.map_err(|_| WebhookError::SignatureMismatch)?;
	mac.update(timestamp.to_string().as_bytes());
	mac.update(b".");
	mac.update(payload);
	Ok(mac)
}

/// Builds a signature header for `payload`.
pub fn sign(payload: &[u8], secret: &str, timestamp: u64) -> Result<String, WebhookError> {
	let mac = mac_for(secret, timestamp, payload)?;
	Ok(format!(
		"t={},v1={}",
		timestamp,
		hex::encode(mac.finalize().into_bytes())
	))
}

/// Checks a signature header against the raw body.
///
/// Any one matching `v1` entry is enough, which allows secret rotation.
pub fn verify_signature(
	payload: &[u8],
	header: &str,
	secret: &str,
	tolerance_seconds: u64,
	now: u64,
) -> Result<(), WebhookError> {
	let mut timestamp = None;
	let mut signatures = Vec::new();
	for part in header.split(',') {
		let (key, value) = part
			.trim()
			.split_once('=')
			.ok_or(WebhookError::MalformedHeader)?;
		match key {
			"t" => {
				timestamp = Some(
					value
						.parse::<u64>()
						.map_err(|_| WebhookError::MalformedHeader)?,
				)
			},
			"v1" => signatures.push(value),
			_ => {},
		}
	}
	let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
	if signatures.is_empty() {
		return Err(WebhookError::MalformedHeader);
	}
	if now.abs_diff(timestamp) > tolerance_seconds {
		return Err(WebhookError::TimestampOutOfTolerance);
	}

	let expected = mac_for(secret, timestamp, payload)?;
	for signature in signatures {
		let Ok(bytes) = hex::decode(signature) else {
			continue;
		};
		if expected.clone().verify_slice(&bytes).is_ok() {
			return Ok(());
		}
	}
	Err(WebhookError::SignatureMismatch)
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
	id: String,
	#[serde(rename = "type")]
	event_type: String,
	#[serde(default)]
	data: EventData,
}

#[derive(Debug, Default, Deserialize)]
struct EventData {
	#[serde(default)]
	object: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProcessedEvent {
	event_type: String,
	received_at: u64,
}

/// What the dispatcher did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
	OrderPaid,
	CreditsPurchased,
	OrderCancelled,
	PaymentFailureLogged,
	Duplicate,
	Ignored,
	NotApplicable,
	InvalidSignature,
	InvalidPayload,
	Error,
}

impl WebhookOutcome {
	pub fn as_str(&self) -> &'static str {
		match self {
			WebhookOutcome::OrderPaid => "order_paid",
			WebhookOutcome::CreditsPurchased => "credits_purchased",
			WebhookOutcome::OrderCancelled => "order_cancelled",
			WebhookOutcome::PaymentFailureLogged => "payment_failure_logged",
			WebhookOutcome::Duplicate => "duplicate",
			WebhookOutcome::Ignored => "ignored",
			WebhookOutcome::NotApplicable => "not_applicable",
			WebhookOutcome::InvalidSignature => "invalid_signature",
			WebhookOutcome::InvalidPayload => "invalid_payload",
			WebhookOutcome::Error => "error",
		}
	}

	pub fn ack(self) -> WebhookAck {
		WebhookAck {
			received: !matches!(
				self,
				WebhookOutcome::InvalidSignature | WebhookOutcome::InvalidPayload
			),
			outcome: self.as_str().to_string(),
		}
	}
}

fn metadata<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
	object
		.get("metadata")
		.and_then(|m| m.get(key))
		.and_then(Value::as_str)
		.filter(|s| !s.is_empty())
}

pub struct WebhookDispatcher {
	storage: Arc<StorageService>,
	actions: Arc<OrderActions>,
	ledger: Arc<CreditLedger>,
	credit_packs: HashMap<String, u64>,
	config: Option<WebhookConfig>,
}

impl WebhookDispatcher {
	pub fn new(
		storage: Arc<StorageService>,
		actions: Arc<OrderActions>,
		ledger: Arc<CreditLedger>,
		credit_packs: HashMap<String, u64>,
		config: Option<WebhookConfig>,
	) -> Self {
		if config.is_none() {
			tracing::warn!("No webhook signing secret configured; payment webhooks will be rejected");
		}
		Self {
			storage,
			actions,
			ledger,
			credit_packs,
			config,
		}
	}

	/// Verifies, deduplicates and dispatches one delivery. Never fails.
	pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> WebhookAck {
		let Some(config) = &self.config else {
			tracing::warn!("Webhook received but no signing secret is configured");
			return WebhookOutcome::InvalidSignature.ack();
		};
		let verified = signature
			.ok_or(WebhookError::MalformedHeader)
			.and_then(|header| {
				verify_signature(
					payload,
					header,
					config.signing_secret.expose_secret(),
					config.tolerance_seconds,
					current_timestamp(),
				)
			});
		if let Err(e) = verified {
			tracing::warn!(error = %e, "Rejected webhook signature");
			return WebhookOutcome::InvalidSignature.ack();
		}

		let event: WebhookEvent = match serde_json::from_slice(payload) {
			Ok(event) => event,
			Err(e) => {
				tracing::warn!(error = %e, "Unreadable webhook payload");
				return WebhookOutcome::InvalidPayload.ack();
			},
		};

		match self.process(&event).await {
			Ok(outcome) => outcome.ack(),
			Err(e) => {
				tracing::error!(event_id = %event.id, event_type = %event.event_type, error = %e, "Webhook processing failed");
				// Forget the event so a replay can process it.
				if let Err(e) = self
					.storage
					.remove(StorageKey::WebhookEvents.as_str(), &event.id)
					.await
				{
					tracing::warn!(error = %e, "Failed to release webhook event id");
				}
				WebhookOutcome::Error.ack()
			},
		}
	}

	#[instrument(skip_all, fields(event_id = %event.id, event_type = %event.event_type))]
	async fn process(&self, event: &WebhookEvent) -> Result<WebhookOutcome, WebhookError> {
		let marker = ProcessedEvent {
			event_type: event.event_type.clone(),
			received_at: current_timestamp(),
		};
		match self
			.storage
			.insert_new(
				StorageKey::WebhookEvents.as_str(),
				&event.id,
				&marker,
				Some(EVENT_RETENTION),
			)
			.await
		{
			Ok(()) => {},
			Err(StorageError::AlreadyExists) => {
				tracing::info!("Duplicate webhook event ignored");
				return Ok(WebhookOutcome::Duplicate);
			},
			Err(e) => return Err(e.into()),
		}

		let object = &event.data.object;
		match event.event_type.as_str() {
			"checkout.session.completed" => self.checkout_completed(object).await,
			"charge.refunded" => self.charge_refunded(object).await,
			"payment_intent.payment_failed" => {
				tracing::warn!(
					order_id = metadata(object, "order_id").unwrap_or("-"),
					"Payment failed; order left unchanged"
				);
				Ok(WebhookOutcome::PaymentFailureLogged)
			},
			_ => Ok(WebhookOutcome::Ignored),
		}
	}

	async fn checkout_completed(&self, object: &Value) -> Result<WebhookOutcome, WebhookError> {
		let reference = object
			.get("payment_intent")
			.and_then(Value::as_str)
			.or_else(|| object.get("id").and_then(Value::as_str))
			.unwrap_or_default();

		if let Some(order_id) = metadata(object, "order_id") {
			return match self
				.actions
				.mark_paid(order_id, reference, WEBHOOK_ACTOR)
				.await
			{
				Ok(_) => Ok(WebhookOutcome::OrderPaid),
				Err(HandlerError::State(OrderStateError::InvalidTransition { from, .. })) => {
					tracing::warn!(order_id = %truncate_id(order_id), status = %from, "Checkout completed for an order that is not a draft");
					Ok(WebhookOutcome::NotApplicable)
				},
				Err(e) => Err(e.into()),
			};
		}

		if let (Some(pack), Some(user_id)) =
			(metadata(object, "credit_pack"), metadata(object, "user_id"))
		{
			let Some(&credits) = self.credit_packs.get(pack) else {
				tracing::warn!(pack, "Checkout for unknown credit pack");
				return Ok(WebhookOutcome::NotApplicable);
			};
			self.ledger.purchase(user_id, credits, reference).await?;
			return Ok(WebhookOutcome::CreditsPurchased);
		}

		Ok(WebhookOutcome::Ignored)
	}

	async fn charge_refunded(&self, object: &Value) -> Result<WebhookOutcome, WebhookError> {
		let Some(order_id) = metadata(object, "order_id") else {
			return Ok(WebhookOutcome::Ignored);
		};
		match self
			.actions
			.cancel(order_id, WEBHOOK_ACTOR, Some("payment refunded".to_string()))
			.await
		{
			Ok(_) => Ok(WebhookOutcome::OrderCancelled),
			Err(HandlerError::State(OrderStateError::InvalidTransition { from, .. })) => {
				tracing::warn!(order_id = %truncate_id(order_id), status = %from, "Refund received for an order that cannot be cancelled");
				Ok(WebhookOutcome::NotApplicable)
			},
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::Harness;
	use vault_storage::StorageInterface;
	use vault_types::OrderStatus;

	const SECRET: &str = "whsec_test";

	struct Fixture {
		harness: Harness,
		ledger: Arc<CreditLedger>,
		dispatcher: WebhookDispatcher,
	}

	async fn fixture() -> Fixture {
		let harness = Harness::new().await;
		let ledger = Arc::new(CreditLedger::new(harness.storage.clone()));
		let actions = Arc::new(OrderActions::new(
			harness.state_machine.clone(),
			harness.notifications.clone(),
		));
		let dispatcher = WebhookDispatcher::new(
			harness.storage.clone(),
			actions,
			ledger.clone(),
			HashMap::from([("starter".to_string(), 10)]),
			Some(WebhookConfig {
				signing_secret: SECRET.into(),
				tolerance_seconds: 300,
			}),
		);
		Fixture {
			harness,
			ledger,
			dispatcher,
		}
	}

	fn event(id: &str, event_type: &str, object: Value) -> Vec<u8> {
		serde_json::to_vec(&serde_json::json!({
			"id": id,
			"type": event_type,
			"data": { "object": object }
		}))
		.unwrap()
	}

	fn signed(payload: &[u8]) -> String {
		sign(payload, SECRET, current_timestamp()).unwrap()
	}

	#[test]
	fn test_signature_verification() {
		let body = br#"{"id":"evt_1"}"#;
		let header = sign(body, SECRET, 1_000).unwrap();
		assert!(verify_signature(body, &header, SECRET, 300, 1_100).is_ok());

		assert!(matches!(
			verify_signature(body, &header, SECRET, 300, 2_000),
			Err(WebhookError::TimestampOutOfTolerance)
		));
		assert!(matches!(
			verify_signature(b"tampered", &header, SECRET, 300, 1_100),
			Err(WebhookError::SignatureMismatch)
		));
		assert!(matches!(
			verify_signature(body, "v1=abc", SECRET, 300, 1_100),
			Err(WebhookError::MalformedHeader)
		));

		let rotated = format!("{},v1=deadbeef", header);
		assert!(verify_signature(body, &rotated, SECRET, 300, 1_100).is_ok());
	}

	#[tokio::test]
	async fn test_checkout_marks_order_paid_once() {
		let f = fixture().await;
		let order = f.harness.draft_order().await;
		let body = event(
			"evt_1",
			"checkout.session.completed",
			serde_json::json!({
				"id": "cs_1",
				"payment_intent": "pi_1",
				"metadata": { "order_id": order.id }
			}),
		);

		let ack = f.dispatcher.handle(&body, Some(&signed(&body))).await;
		assert!(ack.received);
		assert_eq!(ack.outcome, "order_paid");

		let stored = f.harness.state_machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Paid);
		assert_eq!(stored.payment_reference.as_deref(), Some("pi_1"));

		let again = f.dispatcher.handle(&body, Some(&signed(&body))).await;
		assert_eq!(again.outcome, "duplicate");
	}

	#[tokio::test]
	async fn test_credit_pack_purchase() {
		let f = fixture().await;
		let body = event(
			"evt_2",
			"checkout.session.completed",
			serde_json::json!({
				"id": "cs_2",
				"metadata": { "credit_pack": "starter", "user_id": "user-9" }
			}),
		);
		let ack = f.dispatcher.handle(&body, Some(&signed(&body))).await;
		assert_eq!(ack.outcome, "credits_purchased");
		assert_eq!(f.ledger.balance("user-9").await.unwrap(), 10);
	}

	#[tokio::test]
	async fn test_bad_signature_is_acknowledged_but_not_processed() {
		let f = fixture().await;
		let order = f.harness.draft_order().await;
		let body = event(
			"evt_3",
			"checkout.session.completed",
			serde_json::json!({ "metadata": { "order_id": order.id } }),
		);
		let forged = sign(&body, "wrong", current_timestamp()).unwrap();

		let ack = f.dispatcher.handle(&body, Some(&forged)).await;
		assert!(!ack.received);
		assert_eq!(ack.outcome, "invalid_signature");
		let ack = f.dispatcher.handle(&body, None).await;
		assert_eq!(ack.outcome, "invalid_signature");

		let stored = f.harness.state_machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Draft);
	}

	#[tokio::test]
	async fn test_refund_cancels_and_unknown_types_ignored() {
		let f = fixture().await;
		let order = f.harness.queued_order().await;
		let body = event(
			"evt_4",
			"charge.refunded",
			serde_json::json!({ "metadata": { "order_id": order.id } }),
		);
		let ack = f.dispatcher.handle(&body, Some(&signed(&body))).await;
		assert_eq!(ack.outcome, "order_cancelled");

		let body = event("evt_5", "customer.created", serde_json::json!({}));
		let ack = f.dispatcher.handle(&body, Some(&signed(&body))).await;
		assert!(ack.received);
		assert_eq!(ack.outcome, "ignored");

		let ack = f.dispatcher.handle(b"not json", Some(&signed(b"not json"))).await;
		assert_eq!(ack.outcome, "invalid_payload");
	}

	/// Memory backend whose next write to one namespace fails.
	struct FailingWrites {
		inner: vault_storage::implementations::memory::MemoryStorage,
		namespace: &'static str,
		armed: std::sync::atomic::AtomicBool,
	}

	#[async_trait::async_trait]
	impl StorageInterface for FailingWrites {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.inner.get_bytes(key).await
		}

		async fn set_bytes(
			&self,
			key: &str,
			value: Vec<u8>,
			ttl: Option<Duration>,
		) -> Result<(), StorageError> {
			use std::sync::atomic::Ordering;
			if key.starts_with(self.namespace) && self.armed.swap(false, Ordering::SeqCst) {
				return Err(StorageError::Backend("disk full".into()));
			}
			self.inner.set_bytes(key, value, ttl).await
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.inner.delete(key).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.exists(key).await
		}

		async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
			self.inner.list_keys(prefix).await
		}

		fn config_schema(&self) -> Box<dyn vault_types::ConfigSchema> {
			self.inner.config_schema()
		}
	}

	#[tokio::test]
	async fn test_replay_after_failed_ledger_write_credits_once() {
		let harness = Harness::new().await;
		let storage = Arc::new(StorageService::new(Box::new(FailingWrites {
			inner: Default::default(),
			namespace: StorageKey::CreditTransactions.as_str(),
			armed: true.into(),
		})));
		let ledger = Arc::new(CreditLedger::new(storage.clone()));
		let dispatcher = WebhookDispatcher::new(
			storage,
			Arc::new(OrderActions::new(
				harness.state_machine.clone(),
				harness.notifications.clone(),
			)),
			ledger.clone(),
			HashMap::from([("starter".to_string(), 10)]),
			Some(WebhookConfig {
				signing_secret: SECRET.into(),
				tolerance_seconds: 300,
			}),
		);
		let body = event(
			"evt_6",
			"checkout.session.completed",
			serde_json::json!({
				"id": "cs_6",
				"payment_intent": "pi_6",
				"metadata": { "credit_pack": "starter", "user_id": "user-6" }
			}),
		);

		let ack = dispatcher.handle(&body, Some(&signed(&body))).await;
		assert_eq!(ack.outcome, "error");
		assert_eq!(ledger.balance("user-6").await.unwrap(), 10);
		assert!(ledger.history("user-6").await.unwrap().is_empty());

		let ack = dispatcher.handle(&body, Some(&signed(&body))).await;
		assert_eq!(ack.outcome, "credits_purchased");
		assert_eq!(ledger.balance("user-6").await.unwrap(), 10);
		assert_eq!(ledger.history("user-6").await.unwrap().len(), 1);
	}
}
