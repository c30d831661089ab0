//! ClearForm credit wallets and ledger entries.

use serde::{Deserialize, Serialize};

/// Per-user credit balance. One document per user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditWallet {
	pub user_id: String,
	/// Spendable credits; never negative.
	pub balance: u64,
	#[serde(default)]
	pub lifetime_purchased: u64,
	#[serde(default)]
	pub lifetime_spent: u64,
	#[serde(default)]
	pub updated_at: u64,
	/// Checkout references already credited, so a replayed payment is
	/// applied once.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub purchase_references: Vec<String>,
}

impl CreditWallet {
	pub fn new(user_id: impl Into<String>) -> Self {
		Self {
			user_id: user_id.into(),
			..Default::default()
		}
	}
}

/// Kind of movement recorded in the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditKind {
	/// Credits bought through checkout.
	Purchase,
	/// Credits granted by staff or promotions.
	Grant,
	/// Credits spent on a generation.
	Deduction,
	/// Credits returned after a failed generation.
	Refund,
}

/// Immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditTransaction {
	pub id: String,
	pub user_id: String,
	pub kind: CreditKind,
	pub amount: u64,
	pub balance_after: u64,
	/// Checkout session, document id or staff note the movement relates to.
	pub reference: String,
	pub at: u64,
}
