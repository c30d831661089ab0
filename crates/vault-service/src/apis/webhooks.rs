//! Payment webhook intake.

use axum::body::Body;
use axum::http::HeaderMap;
use vault_core::{VaultEngine, WebhookOutcome};
use vault_types::WebhookAck;

/// Header carrying the `t=...,v1=...` signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Reads at most `limit` bytes of the body and hands them to the
/// dispatcher. The provider always gets an acknowledgement, so this cannot
/// fail; an unreadable or oversized body is reported as `invalid_payload`.
pub async fn receive(
	headers: &HeaderMap,
	body: Body,
	limit: usize,
	engine: &VaultEngine,
) -> WebhookAck {
	let body = match axum::body::to_bytes(body, limit).await {
		Ok(body) => body,
		Err(e) => {
			tracing::warn!(limit, error = %e, "Webhook body rejected");
			return WebhookOutcome::InvalidPayload.ack();
		},
	};
	let signature = headers
		.get(SIGNATURE_HEADER)
		.and_then(|value| value.to_str().ok());
	let ack = engine.webhooks().handle(&body, signature).await;
	tracing::info!(
		received = ack.received,
		outcome = %ack.outcome,
		"Payment webhook handled"
	);
	ack
}
