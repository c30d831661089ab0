//! Portfolio compliance score endpoint.

use chrono::NaiveDate;
use serde::Deserialize;
use vault_core::VaultEngine;
use vault_types::{APIError, PortfolioScore};

#[derive(Debug, Default, Deserialize)]
pub struct ScoreQuery {
	/// Score as of this date instead of today (`YYYY-MM-DD`).
	pub date: Option<NaiveDate>,
}

pub async fn portfolio_score(
	client_id: &str,
	query: ScoreQuery,
	engine: &VaultEngine,
) -> Result<PortfolioScore, APIError> {
	let today = query
		.date
		.unwrap_or_else(|| chrono::Utc::now().date_naive());
	engine
		.compliance()
		.portfolio_score(client_id, today)
		.await
		.map_err(|e| APIError::internal(e.to_string()))
}
