//! HTTP server for the vault API.
//!
//! A small surface over the engine: health, payment webhook intake, order
//! reads and actions, ClearForm documents and credits, and the compliance
//! score. Handlers delegate to [`crate::apis`] and log failures.

use crate::apis;
use axum::{
	body::Body,
	extract::{DefaultBodyLimit, Path, Query, State},
	http::{HeaderMap, HeaderValue, Method},
	response::Json,
	routing::{get, post},
	Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use vault_config::{ApiConfig, Config};
use vault_core::VaultEngine;
use vault_types::{
	APIError, ClearFormDocument, OrderActionRequest, OrderResponse, PortfolioScore, WebhookAck,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<VaultEngine>,
	pub config: Config,
	/// Largest webhook body read before answering `invalid_payload`.
	pub max_request_size: usize,
}

/// Permissive CORS unless origins are configured.
fn cors_layer(api_config: &ApiConfig) -> CorsLayer {
	let Some(cors) = &api_config.cors else {
		return CorsLayer::permissive();
	};
	let origins: Vec<HeaderValue> = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| match origin.parse() {
			Ok(value) => Some(value),
			Err(_) => {
				tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
				None
			},
		})
		.collect();
	CorsLayer::new()
		.allow_origin(origins)
		.allow_methods([Method::GET, Method::POST])
		.allow_headers(Any)
}

pub fn router(api_config: &ApiConfig, engine: Arc<VaultEngine>) -> Router {
	let state = AppState {
		config: engine.config().clone(),
		engine,
		max_request_size: api_config.max_request_size,
	};

	Router::new()
		.route("/health", get(handle_health))
		.nest(
			"/api",
			Router::new()
				.route("/webhooks/payments", post(handle_payment_webhook))
				.route("/orders/{id}", get(handle_get_order))
				.route("/orders/{id}/actions/{action}", post(handle_order_action))
				.route("/credits/{user_id}", get(handle_get_credits))
				.route(
					"/clearform/documents",
					get(handle_list_documents).post(handle_generate_document),
				)
				.route("/clearform/documents/{id}", get(handle_get_document))
				.route("/compliance/{client_id}", get(handle_portfolio_score)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(cors_layer(api_config))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

/// Binds the configured address and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<VaultEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(&api_config, engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Vault API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

async fn handle_health(State(state): State<AppState>) -> Json<Value> {
	Json(serde_json::json!({
		"status": "ok",
		"service": state.config.service.id,
	}))
}

/// Handles POST /api/webhooks/payments. Always answers 200, so the body is
/// read here rather than through the size-limited `Bytes` extractor.
async fn handle_payment_webhook(
	State(state): State<AppState>,
	headers: HeaderMap,
	body: Body,
) -> Json<WebhookAck> {
	Json(apis::webhooks::receive(&headers, body, state.max_request_size, &state.engine).await)
}

async fn handle_get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, APIError> {
	match apis::orders::get_order(&id, &state.engine).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Order retrieval failed: {}", e);
			Err(e)
		},
	}
}

async fn handle_order_action(
	Path((id, action)): Path<(String, String)>,
	State(state): State<AppState>,
	Json(request): Json<OrderActionRequest>,
) -> Result<Json<OrderResponse>, APIError> {
	match apis::orders::perform_action(&id, &action, request, &state.engine).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Order action '{}' failed: {}", action, e);
			Err(e)
		},
	}
}

async fn handle_get_credits(
	Path(user_id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<apis::credits::CreditsResponse>, APIError> {
	match apis::credits::get_credits(&user_id, &state.engine).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Credit lookup failed: {}", e);
			Err(e)
		},
	}
}

async fn handle_generate_document(
	State(state): State<AppState>,
	Json(request): Json<apis::clearform::GenerateDocumentRequest>,
) -> Result<Json<ClearFormDocument>, APIError> {
	match apis::clearform::generate_document(request, &state.engine).await {
		Ok(document) => Ok(Json(document)),
		Err(e) => {
			tracing::warn!("Document generation failed: {}", e);
			Err(e)
		},
	}
}

async fn handle_list_documents(
	State(state): State<AppState>,
	Query(query): Query<apis::clearform::ListDocumentsQuery>,
) -> Result<Json<Vec<ClearFormDocument>>, APIError> {
	match apis::clearform::list_documents(query, &state.engine).await {
		Ok(documents) => Ok(Json(documents)),
		Err(e) => {
			tracing::warn!("Document listing failed: {}", e);
			Err(e)
		},
	}
}

async fn handle_get_document(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<ClearFormDocument>, APIError> {
	match apis::clearform::get_document(&id, &state.engine).await {
		Ok(document) => Ok(Json(document)),
		Err(e) => {
			tracing::warn!("Document retrieval failed: {}", e);
			Err(e)
		},
	}
}

async fn handle_portfolio_score(
	Path(client_id): Path<String>,
	State(state): State<AppState>,
	Query(query): Query<apis::compliance::ScoreQuery>,
) -> Result<Json<PortfolioScore>, APIError> {
	match apis::compliance::portfolio_score(&client_id, query, &state.engine).await {
		Ok(score) => Ok(Json(score)),
		Err(e) => {
			tracing::warn!("Compliance scoring failed: {}", e);
			Err(e)
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::{Request, StatusCode};
	use std::str::FromStr;
	use tower::ServiceExt;
	use vault_core::webhooks::sign;
	use vault_types::{current_timestamp, NewOrder, OrderStatus};

	const CONFIG: &str = r#"
[service]
id = "vault-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[notifications]
primary = "log"
from_address = "orders@example.co.uk"
operations_address = "ops@example.co.uk"
[notifications.implementations.log]

[documents]
primary = "template"
[documents.implementations.template]

[credits]
default_cost = 2
[credits.packs]
starter = 10

[webhook]
signing_secret = "whsec_test"

[api]
enabled = true
"#;

	fn engine() -> Arc<VaultEngine> {
		let config = Config::from_str(CONFIG).unwrap();
		Arc::new(crate::build_vault(config).unwrap())
	}

	fn app(engine: &Arc<VaultEngine>) -> Router {
		let api_config = engine.config().api.clone().unwrap();
		router(&api_config, engine.clone())
	}

	async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
		let response = app.oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let body = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap()
		};
		(status, body)
	}

	fn post_json(uri: &str, body: Value) -> Request<Body> {
		Request::post(uri)
			.header("content-type", "application/json")
			.body(Body::from(body.to_string()))
			.unwrap()
	}

	async fn draft_order(engine: &VaultEngine) -> String {
		engine
			.state_machine()
			.create_order(
				NewOrder {
					client_id: "client-1".to_string(),
					client_email: "client@example.co.uk".to_string(),
					organization_id: None,
					service_code: "compliance_pack".to_string(),
					tier: "standard".to_string(),
					client_inputs: serde_json::Map::new(),
				},
				"client-1",
			)
			.await
			.unwrap()
			.id
	}

	#[tokio::test]
	async fn test_health() {
		let engine = engine();
		let (status, body) = send(
			app(&engine),
			Request::get("/health").body(Body::empty()).unwrap(),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["service"], "vault-test");
	}

	#[tokio::test]
	async fn test_unknown_order_is_404() {
		let engine = engine();
		let (status, body) = send(
			app(&engine),
			Request::get("/api/orders/missing").body(Body::empty()).unwrap(),
		)
		.await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "ORDER_NOT_FOUND");
	}

	#[tokio::test]
	async fn test_order_actions() {
		let engine = engine();
		let id = draft_order(&engine).await;

		let (status, body) = send(
			app(&engine),
			post_json(
				&format!("/api/orders/{}/actions/mark-paid", id),
				serde_json::json!({"actor": "staff-1", "note": "pi_123"}),
			),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], serde_json::json!(OrderStatus::Paid));
		assert!(body["sla_deadline"].is_u64());

		// PAID cannot be archived.
		let (status, body) = send(
			app(&engine),
			post_json(
				&format!("/api/orders/{}/actions/archive", id),
				serde_json::json!({"actor": "staff-1"}),
			),
		)
		.await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(body["error"], "INVALID_TRANSITION");

		let (status, _) = send(
			app(&engine),
			post_json(
				&format!("/api/orders/{}/actions/explode", id),
				serde_json::json!({"actor": "staff-1"}),
			),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn test_webhook_always_acknowledges() {
		let engine = engine();
		let (status, body) = send(
			app(&engine),
			post_json("/api/webhooks/payments", serde_json::json!({"id": "evt_1"})),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["received"], false);
		assert_eq!(body["outcome"], "invalid_signature");
	}

	#[tokio::test]
	async fn test_oversized_webhook_is_acknowledged() {
		let engine = engine();
		let mut api_config = engine.config().api.clone().unwrap();
		api_config.max_request_size = 1024;
		let app = router(&api_config, engine.clone());

		let payload = vec![b'x'; 4096];
		let signature = sign(&payload, "whsec_test", current_timestamp()).unwrap();
		let request = Request::post("/api/webhooks/payments")
			.header("Stripe-Signature", signature)
			.body(Body::from(payload))
			.unwrap();
		let (status, body) = send(app, request).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["received"], false);
		assert_eq!(body["outcome"], "invalid_payload");
	}

	#[tokio::test]
	async fn test_signed_credit_purchase_then_generate() {
		let engine = engine();
		let payload = serde_json::json!({
			"id": "evt_credits",
			"type": "checkout.session.completed",
			"data": {"object": {
				"id": "cs_1",
				"metadata": {"user_id": "user-1", "credit_pack": "starter"}
			}}
		})
		.to_string();
		let signature = sign(payload.as_bytes(), "whsec_test", current_timestamp()).unwrap();
		let request = Request::post("/api/webhooks/payments")
			.header("Stripe-Signature", signature)
			.body(Body::from(payload))
			.unwrap();
		let (status, body) = send(app(&engine), request).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["outcome"], "credits_purchased");

		let (_, credits) = send(
			app(&engine),
			Request::get("/api/credits/user-1").body(Body::empty()).unwrap(),
		)
		.await;
		assert_eq!(credits["wallet"]["balance"], 10);

		let (status, document) = send(
			app(&engine),
			post_json(
				"/api/clearform/documents",
				serde_json::json!({
					"user_id": "user-1",
					"document_type": "formal_letter",
					"intent": "Ask the landlord to fix the boiler"
				}),
			),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(document["credits_charged"], 2);

		let (_, listed) = send(
			app(&engine),
			Request::get("/api/clearform/documents?user_id=user-1")
				.body(Body::empty())
				.unwrap(),
		)
		.await;
		assert_eq!(listed.as_array().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_generate_without_credits_is_422() {
		let engine = engine();
		let (status, body) = send(
			app(&engine),
			post_json(
				"/api/clearform/documents",
				serde_json::json!({
					"user_id": "user-2",
					"document_type": "formal_letter",
					"intent": "Dispute a parking fine"
				}),
			),
		)
		.await;
		assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
		assert_eq!(body["error"], "INSUFFICIENT_CREDITS");
		assert_eq!(body["details"]["required"], 2);
	}

	#[tokio::test]
	async fn test_compliance_score_for_empty_portfolio() {
		let engine = engine();
		let (status, body) = send(
			app(&engine),
			Request::get("/api/compliance/client-9?date=2024-06-01")
				.body(Body::empty())
				.unwrap(),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["score"], 100);
	}
}
