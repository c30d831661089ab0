//! ClearForm document generation paid for with credits.

use crate::credits::{CreditError, CreditLedger};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use vault_config::CreditsConfig;
use vault_documents::{DocumentService, GenerationRequest};
use vault_storage::{QueryFilter, StorageError, StorageService};
use vault_types::{current_timestamp, truncate_id, ClearFormDocument, ClearFormStatus, StorageKey};

#[derive(Debug, Error)]
pub enum ClearFormError {
	#[error(transparent)]
	Credits(#[from] CreditError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Document not found: {0}")]
	NotFound(String),
	#[error("Generation failed for document {document_id}: {reason}")]
	GenerationFailed { document_id: String, reason: String },
}

pub struct ClearFormService {
	storage: Arc<StorageService>,
	ledger: Arc<CreditLedger>,
	documents: Arc<DocumentService>,
	credits: CreditsConfig,
}

impl ClearFormService {
	pub fn new(
		storage: Arc<StorageService>,
		ledger: Arc<CreditLedger>,
		documents: Arc<DocumentService>,
		credits: CreditsConfig,
	) -> Self {
		Self {
			storage,
			ledger,
			documents,
			credits,
		}
	}

	/// Charges the user, generates the document and stores it.
	///
	/// When generation fails the charge is refunded and the record is kept
	/// as FAILED; the error names the record so the caller can show it.
	#[instrument(skip_all, fields(user_id = %truncate_id(user_id), document_type = %document_type))]
	pub async fn generate(
		&self,
		user_id: &str,
		document_type: &str,
		intent: &str,
	) -> Result<ClearFormDocument, ClearFormError> {
		let cost = self.credits.cost_for(document_type);
		let document_id = uuid::Uuid::new_v4().to_string();
		self.ledger.deduct(user_id, cost, &document_id).await?;

		let mut record = ClearFormDocument {
			id: document_id.clone(),
			user_id: user_id.to_string(),
			document_type: document_type.to_string(),
			status: ClearFormStatus::Pending,
			credits_charged: cost,
			refunded: false,
			intent: intent.to_string(),
			content: None,
			content_hash: None,
			error: None,
			created_at: current_timestamp(),
		};
		if let Err(e) = self.save(&record).await {
			self.refund(&record).await;
			return Err(e);
		}

		let mut request = GenerationRequest::new(&document_id, document_type);
		request.intent = Some(intent.to_string());

		match self.documents.generate(&request).await {
			Ok(sealed) => {
				record.status = ClearFormStatus::Generated;
				record.content = Some(sealed.document.content);
				record.content_hash = Some(sealed.content_hash);
				self.save(&record).await?;
				tracing::info!(document_id = %truncate_id(&document_id), cost, "ClearForm document generated");
				Ok(record)
			},
			Err(e) => {
				let reason = e.to_string();
				tracing::warn!(document_id = %truncate_id(&document_id), error = %reason, "ClearForm generation failed");
				record.refunded = self.refund(&record).await;
				record.status = ClearFormStatus::Failed;
				record.error = Some(reason.clone());
				self.save(&record).await?;
				Err(ClearFormError::GenerationFailed {
					document_id,
					reason,
				})
			},
		}
	}

	pub async fn get(&self, document_id: &str) -> Result<ClearFormDocument, ClearFormError> {
		self.storage
			.find(StorageKey::ClearFormDocuments.as_str(), document_id)
			.await?
			.ok_or_else(|| ClearFormError::NotFound(document_id.to_string()))
	}

	/// A user's documents, newest first.
	pub async fn list_for_user(
		&self,
		user_id: &str,
	) -> Result<Vec<ClearFormDocument>, ClearFormError> {
		let mut documents: Vec<ClearFormDocument> = self
			.storage
			.query(
				StorageKey::ClearFormDocuments.as_str(),
				QueryFilter::Equals("user_id".to_string(), serde_json::json!(user_id)),
			)
			.await?
			.into_iter()
			.map(|(_, document)| document)
			.collect();
		documents.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
		Ok(documents)
	}

	async fn save(&self, record: &ClearFormDocument) -> Result<(), ClearFormError> {
		self.storage
			.store(StorageKey::ClearFormDocuments.as_str(), &record.id, record)
			.await?;
		Ok(())
	}

	async fn refund(&self, record: &ClearFormDocument) -> bool {
		match self
			.ledger
			.refund(&record.user_id, record.credits_charged, &record.id)
			.await
		{
			Ok(_) => true,
			Err(e) => {
				tracing::error!(document_id = %truncate_id(&record.id), error = %e, "Credit refund failed");
				false
			},
		}
	}
}
