//! Storage-related types for the vault.

use std::str::FromStr;

/// Collections (namespaces) in the document store.
///
/// Replaces string literals at call sites with typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Fulfilment orders
	Orders,
	/// ClearForm credit wallets, keyed by user id
	CreditWallets,
	/// ClearForm credit ledger entries
	CreditTransactions,
	/// ClearForm generated documents
	ClearFormDocuments,
	/// Consent event log
	ConsentEvents,
	/// Derived consent state, keyed by client id
	ConsentStates,
	/// Scheduled lead-nurture emails
	LeadFollowUps,
	/// Organizations
	Organizations,
	/// Owner user id -> organization id index
	OrganizationOwners,
	/// Processed payment webhook event ids
	WebhookEvents,
	/// Properties tracked for compliance scoring
	Properties,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::CreditWallets => "credit_wallets",
			StorageKey::CreditTransactions => "credit_transactions",
			StorageKey::ClearFormDocuments => "clearform_documents",
			StorageKey::ConsentEvents => "consent_events",
			StorageKey::ConsentStates => "consent_states",
			StorageKey::LeadFollowUps => "lead_follow_ups",
			StorageKey::Organizations => "organizations",
			StorageKey::OrganizationOwners => "organization_owners",
			StorageKey::WebhookEvents => "webhook_events",
			StorageKey::Properties => "properties",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::CreditWallets,
			Self::CreditTransactions,
			Self::ClearFormDocuments,
			Self::ConsentEvents,
			Self::ConsentStates,
			Self::LeadFollowUps,
			Self::Organizations,
			Self::OrganizationOwners,
			Self::WebhookEvents,
			Self::Properties,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_round_trip_names() {
		for key in StorageKey::all() {
			assert_eq!(key.as_str().parse::<StorageKey>(), Ok(key));
		}
		assert!("unknown".parse::<StorageKey>().is_err());
	}
}
