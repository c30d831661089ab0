//! ClearForm document generation endpoints.

use crate::apis::credits::credit_error;
use serde::Deserialize;
use vault_core::{ClearFormError, VaultEngine};
use vault_types::{APIError, ClearFormDocument};

#[derive(Debug, Deserialize)]
pub struct GenerateDocumentRequest {
	pub user_id: String,
	pub document_type: String,
	pub intent: String,
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
	pub user_id: String,
}

pub fn clearform_error(e: ClearFormError) -> APIError {
	match e {
		ClearFormError::Credits(e) => credit_error(e),
		ClearFormError::NotFound(id) => {
			APIError::not_found("DOCUMENT_NOT_FOUND", format!("Document not found: {}", id))
		},
		e @ ClearFormError::GenerationFailed { .. } => APIError::InternalServerError {
			error_type: "GENERATION_FAILED".to_string(),
			message: e.to_string(),
		},
		ClearFormError::Storage(e) => APIError::internal(e.to_string()),
	}
}

/// Charges the user and generates a document from their intent.
pub async fn generate_document(
	request: GenerateDocumentRequest,
	engine: &VaultEngine,
) -> Result<ClearFormDocument, APIError> {
	for (field, value) in [
		("user_id", &request.user_id),
		("document_type", &request.document_type),
		("intent", &request.intent),
	] {
		if value.trim().is_empty() {
			return Err(APIError::bad_request(
				"MISSING_FIELD",
				format!("{} cannot be empty", field),
			));
		}
	}

	engine
		.clearform()
		.generate(&request.user_id, &request.document_type, &request.intent)
		.await
		.map_err(clearform_error)
}

pub async fn get_document(id: &str, engine: &VaultEngine) -> Result<ClearFormDocument, APIError> {
	engine.clearform().get(id).await.map_err(clearform_error)
}

pub async fn list_documents(
	query: ListDocumentsQuery,
	engine: &VaultEngine,
) -> Result<Vec<ClearFormDocument>, APIError> {
	engine
		.clearform()
		.list_for_user(&query.user_id)
		.await
		.map_err(clearform_error)
}
