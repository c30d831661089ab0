//! Property compliance scoring.
//!
//! A requirement's status is derived from its expiry date relative to
//! `today`. The property score is the weighted share of satisfied
//! requirements, where an expiring requirement counts half. The portfolio
//! score is the mean of the property scores.

use chrono::NaiveDate;
use std::sync::Arc;
use vault_config::ComplianceConfig;
use vault_storage::{QueryFilter, StorageError, StorageService};
use vault_types::{
	ComplianceGrade, PortfolioScore, Property, PropertyScore, Requirement, RequirementScore,
	RequirementStatus, StorageKey,
};

/// Status of one requirement on `today`. A certificate expiring today is
/// still valid today.
pub fn requirement_status(
	requirement: &Requirement,
	today: NaiveDate,
	expiring_soon_days: i64,
) -> RequirementStatus {
	match requirement.expires_at {
		None => RequirementStatus::Missing,
		Some(expiry) if expiry < today => RequirementStatus::Overdue,
		Some(expiry) if (expiry - today).num_days() <= expiring_soon_days => {
			RequirementStatus::ExpiringSoon
		},
		Some(_) => RequirementStatus::Compliant,
	}
}

/// Per-property override, then configured weight, then the type default.
pub fn weight_for(requirement: &Requirement, config: &ComplianceConfig) -> u32 {
	requirement
		.weight
		.or_else(|| {
			config
				.weights
				.get(requirement.requirement_type.as_str())
				.copied()
		})
		.unwrap_or_else(|| requirement.requirement_type.default_weight())
}

pub fn score_property(
	property: &Property,
	today: NaiveDate,
	config: &ComplianceConfig,
) -> PropertyScore {
	let requirements: Vec<RequirementScore> = property
		.requirements
		.iter()
		.map(|requirement| RequirementScore {
			requirement_type: requirement.requirement_type,
			status: requirement_status(requirement, today, config.expiring_soon_days),
			weight: weight_for(requirement, config),
		})
		.collect();

	let total: u64 = requirements.iter().map(|r| u64::from(r.weight)).sum();
	let score = if requirements.is_empty() {
		100
	} else if total == 0 {
		// Every requirement was weighted out; nothing counts as satisfied.
		0
	} else {
		let achieved: f64 = requirements
			.iter()
			.map(|r| f64::from(r.weight) * r.status.factor())
			.sum();
		(100.0 * achieved / total as f64).round() as u32
	};

	PropertyScore {
		property_id: property.id.clone(),
		score,
		grade: ComplianceGrade::from_score(score),
		requirements,
	}
}

pub fn score_portfolio(
	client_id: &str,
	properties: &[Property],
	today: NaiveDate,
	config: &ComplianceConfig,
) -> PortfolioScore {
	let scores: Vec<PropertyScore> = properties
		.iter()
		.map(|p| score_property(p, today, config))
		.collect();
	let score = if scores.is_empty() {
		100
	} else {
		let sum: u64 = scores.iter().map(|s| u64::from(s.score)).sum();
		(sum as f64 / scores.len() as f64).round() as u32
	};

	PortfolioScore {
		client_id: client_id.to_string(),
		score,
		grade: ComplianceGrade::from_score(score),
		properties: scores,
	}
}

/// Stores properties and scores a client's portfolio.
pub struct ComplianceService {
	storage: Arc<StorageService>,
	config: ComplianceConfig,
}

impl ComplianceService {
	pub fn new(storage: Arc<StorageService>, config: ComplianceConfig) -> Self {
		Self { storage, config }
	}

	pub async fn upsert_property(&self, property: &Property) -> Result<(), StorageError> {
		self.storage
			.store(StorageKey::Properties.as_str(), &property.id, property)
			.await
	}

	pub async fn properties_for(&self, client_id: &str) -> Result<Vec<Property>, StorageError> {
		Ok(self
			.storage
			.query(
				StorageKey::Properties.as_str(),
				QueryFilter::Equals("client_id".to_string(), serde_json::json!(client_id)),
			)
			.await?
			.into_iter()
			.map(|(_, property)| property)
			.collect())
	}

	pub async fn portfolio_score(
		&self,
		client_id: &str,
		today: NaiveDate,
	) -> Result<PortfolioScore, StorageError> {
		let properties = self.properties_for(client_id).await?;
		Ok(score_portfolio(client_id, &properties, today, &self.config))
	}
}
