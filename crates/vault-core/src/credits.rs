//! ClearForm credit ledger.
//!
//! Each user has one wallet document. Every balance change happens inside a
//! single atomic update of that document, so a deduction either sees enough
//! credits and takes them or leaves the wallet untouched. The ledger entry is
//! written after the wallet; the two are not one transaction. Purchases are
//! keyed by their checkout reference: the wallet remembers which references
//! it has been credited for and the ledger entry id is derived from the
//! reference, so replaying a purchase after a failed ledger write only
//! writes the missing entry.

use std::sync::Arc;
use thiserror::Error;
use vault_storage::{QueryFilter, StorageError, StorageService};
use vault_types::{
	current_timestamp, truncate_id, CreditKind, CreditTransaction, CreditWallet, StorageKey,
};

#[derive(Debug, Error)]
pub enum CreditError {
	#[error("Credit amount must be greater than zero")]
	InvalidAmount,
	#[error("Insufficient credits: balance {balance}, required {required}")]
	InsufficientCredits { balance: u64, required: u64 },
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Ledger entry id for a purchase, stable across replays.
fn purchase_entry_id(user_id: &str, reference: &str) -> String {
	format!("purchase-{}-{}", user_id, reference)
}

pub struct CreditLedger {
	storage: Arc<StorageService>,
}

impl CreditLedger {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Current wallet; users who never held credits have an empty one.
	pub async fn wallet(&self, user_id: &str) -> Result<CreditWallet, CreditError> {
		Ok(self
			.storage
			.find(StorageKey::CreditWallets.as_str(), user_id)
			.await?
			.unwrap_or_else(|| CreditWallet::new(user_id)))
	}

	pub async fn balance(&self, user_id: &str) -> Result<u64, CreditError> {
		Ok(self.wallet(user_id).await?.balance)
	}

	/// Credits bought through checkout.
	pub async fn purchase(
		&self,
		user_id: &str,
		amount: u64,
		reference: &str,
	) -> Result<CreditTransaction, CreditError> {
		self.apply(user_id, CreditKind::Purchase, amount, reference)
			.await
	}

	/// Credits given by staff or a promotion.
	pub async fn grant(
		&self,
		user_id: &str,
		amount: u64,
		reference: &str,
	) -> Result<CreditTransaction, CreditError> {
		self.apply(user_id, CreditKind::Grant, amount, reference)
			.await
	}

	/// Takes `amount` credits if the balance covers it.
	pub async fn deduct(
		&self,
		user_id: &str,
		amount: u64,
		reference: &str,
	) -> Result<CreditTransaction, CreditError> {
		self.apply(user_id, CreditKind::Deduction, amount, reference)
			.await
	}

	/// Returns credits taken by an earlier deduction.
	pub async fn refund(
		&self,
		user_id: &str,
		amount: u64,
		reference: &str,
	) -> Result<CreditTransaction, CreditError> {
		self.apply(user_id, CreditKind::Refund, amount, reference)
			.await
	}

	/// Ledger entries for a user, oldest first.
	pub async fn history(&self, user_id: &str) -> Result<Vec<CreditTransaction>, CreditError> {
		let mut entries: Vec<CreditTransaction> = self
			.storage
			.query(
				StorageKey::CreditTransactions.as_str(),
				QueryFilter::Equals("user_id".to_string(), serde_json::json!(user_id)),
			)
			.await?
			.into_iter()
			.map(|(_, entry)| entry)
			.collect();
		entries.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.id.cmp(&b.id)));
		Ok(entries)
	}

	async fn apply(
		&self,
		user_id: &str,
		kind: CreditKind,
		amount: u64,
		reference: &str,
	) -> Result<CreditTransaction, CreditError> {
		if amount == 0 {
			return Err(CreditError::InvalidAmount);
		}
		let now = current_timestamp();
		let purchase_key = (kind == CreditKind::Purchase && !reference.is_empty())
			.then(|| purchase_entry_id(user_id, reference));
		let mut replayed = false;

		let wallet = self
			.storage
			.upsert(
				StorageKey::CreditWallets.as_str(),
				user_id,
				|| CreditWallet::new(user_id),
				|wallet: &mut CreditWallet| {
					match kind {
						CreditKind::Purchase => {
							if purchase_key.is_some()
								&& wallet.purchase_references.iter().any(|r| r == reference)
							{
								replayed = true;
								return Ok(());
							}
							wallet.balance += amount;
							wallet.lifetime_purchased += amount;
							if purchase_key.is_some() {
								wallet.purchase_references.push(reference.to_string());
							}
						},
						CreditKind::Grant => wallet.balance += amount,
						CreditKind::Deduction => {
							if wallet.balance < amount {
								return Err(CreditError::InsufficientCredits {
									balance: wallet.balance,
									required: amount,
								});
							}
							wallet.balance -= amount;
							wallet.lifetime_spent += amount;
						},
						CreditKind::Refund => {
							wallet.balance += amount;
							wallet.lifetime_spent = wallet.lifetime_spent.saturating_sub(amount);
						},
					}
					wallet.updated_at = now;
					Ok(())
				},
			)
			.await?;

		let entry = CreditTransaction {
			id: purchase_key.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
			user_id: user_id.to_string(),
			kind,
			amount,
			balance_after: wallet.balance,
			reference: reference.to_string(),
			at: now,
		};
		match self
			.storage
			.insert_new(
				StorageKey::CreditTransactions.as_str(),
				&entry.id,
				&entry,
				None,
			)
			.await
		{
			Ok(()) => {},
			Err(StorageError::AlreadyExists) if replayed => {
				tracing::info!(
					user_id = %truncate_id(user_id),
					reference,
					"Purchase already credited"
				);
				return Ok(self
					.storage
					.retrieve(StorageKey::CreditTransactions.as_str(), &entry.id)
					.await?);
			},
			Err(e) => return Err(e.into()),
		}
		if replayed {
			tracing::warn!(
				user_id = %truncate_id(user_id),
				reference,
				"Recorded missing ledger entry for an already credited purchase"
			);
			return Ok(entry);
		}

		tracing::info!(
			user_id = %truncate_id(user_id),
			kind = ?kind,
			amount,
			balance = wallet.balance,
			"Credit ledger updated"
		);
		Ok(entry)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use vault_storage::implementations::memory::MemoryStorage;

	fn ledger() -> CreditLedger {
		CreditLedger::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	#[tokio::test]
	async fn test_unknown_user_has_zero_balance() {
		let ledger = ledger();
		assert_eq!(ledger.balance("nobody").await.unwrap(), 0);
		assert!(ledger.history("nobody").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_deduct_never_goes_negative() {
		let ledger = ledger();
		ledger.purchase("user-1", 3, "cs_1").await.unwrap();

		let err = ledger.deduct("user-1", 5, "doc-1").await.unwrap_err();
		assert!(matches!(
			err,
			CreditError::InsufficientCredits {
				balance: 3,
				required: 5
			}
		));
		assert_eq!(ledger.balance("user-1").await.unwrap(), 3);

		let entry = ledger.deduct("user-1", 3, "doc-2").await.unwrap();
		assert_eq!(entry.balance_after, 0);
		assert!(ledger.deduct("user-1", 1, "doc-3").await.is_err());
	}

	#[tokio::test]
	async fn test_zero_amount_rejected() {
		let ledger = ledger();
		assert!(matches!(
			ledger.grant("user-1", 0, "promo").await,
			Err(CreditError::InvalidAmount)
		));
	}

	#[tokio::test]
	async fn test_concurrent_deductions_cannot_overspend() {
		let ledger = Arc::new(ledger());
		ledger.grant("user-1", 5, "promo").await.unwrap();

		let mut handles = Vec::new();
		for i in 0..10 {
			let ledger = ledger.clone();
			handles.push(tokio::spawn(async move {
				ledger.deduct("user-1", 1, &format!("doc-{i}")).await.is_ok()
			}));
		}
		let mut succeeded = 0;
		for handle in handles {
			if handle.await.unwrap() {
				succeeded += 1;
			}
		}
		assert_eq!(succeeded, 5);
		assert_eq!(ledger.balance("user-1").await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_history_and_lifetime_totals() {
		let ledger = ledger();
		ledger.purchase("user-1", 10, "cs_1").await.unwrap();
		ledger.deduct("user-1", 4, "doc-1").await.unwrap();
		ledger.refund("user-1", 4, "doc-1").await.unwrap();

		let wallet = ledger.wallet("user-1").await.unwrap();
		assert_eq!(wallet.balance, 10);
		assert_eq!(wallet.lifetime_purchased, 10);
		assert_eq!(wallet.lifetime_spent, 0);

		let kinds: Vec<CreditKind> = ledger
			.history("user-1")
			.await
			.unwrap()
			.iter()
			.map(|t| t.kind)
			.collect();
		assert_eq!(kinds.len(), 3);
		assert!(kinds.contains(&CreditKind::Refund));
	}

	#[tokio::test]
	async fn test_purchase_is_applied_once_per_reference() {
		let ledger = ledger();
		let first = ledger.purchase("user-1", 10, "pi_1").await.unwrap();
		let again = ledger.purchase("user-1", 10, "pi_1").await.unwrap();
		assert_eq!(first.id, again.id);

		let wallet = ledger.wallet("user-1").await.unwrap();
		assert_eq!(wallet.balance, 10);
		assert_eq!(wallet.lifetime_purchased, 10);
		assert_eq!(ledger.history("user-1").await.unwrap().len(), 1);

		ledger.purchase("user-1", 5, "pi_2").await.unwrap();
		assert_eq!(ledger.balance("user-1").await.unwrap(), 15);
	}
}
