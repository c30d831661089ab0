//! ClearForm credit balance endpoint.

use serde::{Deserialize, Serialize};
use vault_core::{CreditError, VaultEngine};
use vault_types::{APIError, CreditTransaction, CreditWallet};

/// Wallet together with its ledger, newest entry first.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreditsResponse {
	pub wallet: CreditWallet,
	pub transactions: Vec<CreditTransaction>,
}

pub fn credit_error(e: CreditError) -> APIError {
	match e {
		CreditError::InvalidAmount => APIError::bad_request("INVALID_AMOUNT", e.to_string()),
		CreditError::InsufficientCredits { balance, required } => {
			APIError::UnprocessableEntity {
				error_type: "INSUFFICIENT_CREDITS".to_string(),
				message: e.to_string(),
				details: Some(serde_json::json!({
					"balance": balance,
					"required": required,
				})),
			}
		},
		CreditError::Storage(e) => APIError::internal(e.to_string()),
	}
}

pub async fn get_credits(user_id: &str, engine: &VaultEngine) -> Result<CreditsResponse, APIError> {
	let ledger = engine.ledger();
	let wallet = ledger.wallet(user_id).await.map_err(credit_error)?;
	let mut transactions = ledger.history(user_id).await.map_err(credit_error)?;
	transactions.reverse();
	Ok(CreditsResponse {
		wallet,
		transactions,
	})
}
