//! Document version history of an order.
//!
//! Versions are numbered from 1 and only ever appended. Approving an order
//! locks its latest version, after which no new version may be added.

use super::OrderStateError;
use vault_documents::SealedDocument;
use vault_types::{DocumentVersion, Order, VersionStatus};

/// Appends a new draft version and supersedes the previous draft.
///
/// Returns the new version number.
pub fn add_version(
	order: &mut Order,
	sealed: &SealedDocument,
	now: u64,
) -> Result<u32, OrderStateError> {
	if order.is_locked() {
		return Err(OrderStateError::VersionLocked(order.id.clone()));
	}

	let next = order.documents.iter().map(|v| v.version).max().unwrap_or(0) + 1;
	for previous in order
		.documents
		.iter_mut()
		.filter(|v| v.status == VersionStatus::Draft)
	{
		previous.status = VersionStatus::Superseded;
	}

	order.documents.push(DocumentVersion {
		version: next,
		document_type: sealed.document.document_type.clone(),
		filename: sealed.document.filename.clone(),
		content_hash: sealed.content_hash.clone(),
		generator: sealed.document.generator.clone(),
		generated_at: now,
		status: VersionStatus::Draft,
		locked: false,
		content: sealed.document.content.clone(),
	});
	Ok(next)
}

/// Marks the latest version final and locks it.
pub fn lock_current(order: &mut Order) -> Result<u32, OrderStateError> {
	let current = order
		.documents
		.iter_mut()
		.max_by_key(|v| v.version)
		.ok_or_else(|| OrderStateError::NoDocuments(order.id.clone()))?;
	current.status = VersionStatus::Final;
	current.locked = true;
	Ok(current.version)
}
