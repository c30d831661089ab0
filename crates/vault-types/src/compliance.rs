//! Property compliance records.
//!
//! A property carries one requirement per certificate or check a UK landlord
//! has to keep current. Scores are computed from these records on demand.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Certificate or check a property must hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
	GasSafety,
	Eicr,
	Epc,
	FireRisk,
	SmokeCoAlarms,
	Legionella,
	HmoLicence,
	#[serde(other)]
	Other,
}

impl RequirementType {
	/// Weight used when no override is configured.
	pub fn default_weight(&self) -> u32 {
		match self {
			RequirementType::GasSafety | RequirementType::Eicr => 3,
			RequirementType::Epc
			| RequirementType::FireRisk
			| RequirementType::SmokeCoAlarms
			| RequirementType::HmoLicence => 2,
			RequirementType::Legionella | RequirementType::Other => 1,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			RequirementType::GasSafety => "gas_safety",
			RequirementType::Eicr => "eicr",
			RequirementType::Epc => "epc",
			RequirementType::FireRisk => "fire_risk",
			RequirementType::SmokeCoAlarms => "smoke_co_alarms",
			RequirementType::Legionella => "legionella",
			RequirementType::HmoLicence => "hmo_licence",
			RequirementType::Other => "other",
		}
	}
}

/// Status of a requirement relative to a given day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequirementStatus {
	Compliant,
	ExpiringSoon,
	Overdue,
	Missing,
}

impl RequirementStatus {
	/// Contribution of the requirement's weight to the score.
	pub fn factor(&self) -> f64 {
		match self {
			RequirementStatus::Compliant => 1.0,
			RequirementStatus::ExpiringSoon => 0.5,
			RequirementStatus::Overdue | RequirementStatus::Missing => 0.0,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requirement {
	pub requirement_type: RequirementType,
	/// Expiry of the current certificate; absent when none is on file.
	#[serde(default)]
	pub expires_at: Option<NaiveDate>,
	/// Overrides the type's weight for this property.
	#[serde(default)]
	pub weight: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
	pub id: String,
	pub client_id: String,
	pub address: String,
	#[serde(default)]
	pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComplianceGrade {
	A,
	B,
	C,
	D,
}

impl ComplianceGrade {
	pub fn from_score(score: u32) -> Self {
		match score {
			90.. => ComplianceGrade::A,
			75..=89 => ComplianceGrade::B,
			50..=74 => ComplianceGrade::C,
			_ => ComplianceGrade::D,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequirementScore {
	pub requirement_type: RequirementType,
	pub status: RequirementStatus,
	pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyScore {
	pub property_id: String,
	/// 0-100.
	pub score: u32,
	pub grade: ComplianceGrade,
	pub requirements: Vec<RequirementScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioScore {
	pub client_id: String,
	pub score: u32,
	pub grade: ComplianceGrade,
	pub properties: Vec<PropertyScore>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_grade_bands() {
		assert_eq!(ComplianceGrade::from_score(100), ComplianceGrade::A);
		assert_eq!(ComplianceGrade::from_score(90), ComplianceGrade::A);
		assert_eq!(ComplianceGrade::from_score(89), ComplianceGrade::B);
		assert_eq!(ComplianceGrade::from_score(75), ComplianceGrade::B);
		assert_eq!(ComplianceGrade::from_score(50), ComplianceGrade::C);
		assert_eq!(ComplianceGrade::from_score(49), ComplianceGrade::D);
	}

	#[test]
	fn test_unknown_requirement_type_maps_to_other() {
		let req: Requirement =
			serde_json::from_str(r#"{"requirement_type":"asbestos_survey"}"#).unwrap();
		assert_eq!(req.requirement_type, RequirementType::Other);
		assert_eq!(req.expires_at, None);
	}
}
