//! Organization records.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
	Owner,
	Admin,
	Member,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
	pub user_id: String,
	pub role: MemberRole,
	pub joined_at: u64,
}

/// A tenant organization. Each user owns at most one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
	pub id: String,
	pub name: String,
	pub owner_id: String,
	#[serde(default)]
	pub members: Vec<Member>,
	pub created_at: u64,
}

impl Organization {
	pub fn member(&self, user_id: &str) -> Option<&Member> {
		self.members.iter().find(|m| m.user_id == user_id)
	}
}
