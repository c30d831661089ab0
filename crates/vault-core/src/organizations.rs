//! Organizations and their members.
//!
//! A user may own at most one organization. Ownership is claimed through an
//! owner index document keyed by user id; claiming is an insert-if-absent,
//! so two concurrent creations by the same user cannot both succeed.

use std::sync::Arc;
use thiserror::Error;
use vault_storage::{StorageError, StorageService};
use vault_types::{current_timestamp, truncate_id, Member, MemberRole, Organization, StorageKey};

#[derive(Debug, Error)]
pub enum OrganizationError {
	#[error("User {0} already owns an organization")]
	DuplicateOwnership(String),
	#[error("Organization not found: {0}")]
	NotFound(String),
	#[error("User {0} is already a member")]
	AlreadyMember(String),
	#[error("User {0} is not a member")]
	NotMember(String),
	#[error("The owner cannot be removed from the organization")]
	OwnerRemoval,
	#[error("Invalid organization: {0}")]
	Invalid(String),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

pub struct OrganizationService {
	storage: Arc<StorageService>,
}

impl OrganizationService {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	pub async fn create(&self, name: &str, owner_id: &str) -> Result<Organization, OrganizationError> {
		let name = name.trim();
		if name.is_empty() {
			return Err(OrganizationError::Invalid("name must not be empty".into()));
		}
		let now = current_timestamp();
		let organization = Organization {
			id: uuid::Uuid::new_v4().to_string(),
			name: name.to_string(),
			owner_id: owner_id.to_string(),
			members: vec![Member {
				user_id: owner_id.to_string(),
				role: MemberRole::Owner,
				joined_at: now,
			}],
			created_at: now,
		};

		self.storage
			.insert_new(
				StorageKey::OrganizationOwners.as_str(),
				owner_id,
				&organization.id,
				None,
			)
			.await
			.map_err(|e| match e {
				StorageError::AlreadyExists => {
					OrganizationError::DuplicateOwnership(owner_id.to_string())
				},
				other => other.into(),
			})?;

		if let Err(e) = self
			.storage
			.insert_new(
				StorageKey::Organizations.as_str(),
				&organization.id,
				&organization,
				None,
			)
			.await
		{
			// Release the claim so the owner can try again.
			if let Err(release) = self
				.storage
				.remove(StorageKey::OrganizationOwners.as_str(), owner_id)
				.await
			{
				tracing::error!(error = %release, "Failed to release owner index entry");
			}
			return Err(e.into());
		}

		tracing::info!(
			organization_id = %truncate_id(&organization.id),
			owner_id = %truncate_id(owner_id),
			"Organization created"
		);
		Ok(organization)
	}

	pub async fn get(&self, organization_id: &str) -> Result<Organization, OrganizationError> {
		self.storage
			.find(StorageKey::Organizations.as_str(), organization_id)
			.await?
			.ok_or_else(|| OrganizationError::NotFound(organization_id.to_string()))
	}

	/// The organization `user_id` owns, if any.
	pub async fn organization_for_owner(
		&self,
		user_id: &str,
	) -> Result<Option<Organization>, OrganizationError> {
		let id: Option<String> = self
			.storage
			.find(StorageKey::OrganizationOwners.as_str(), user_id)
			.await?;
		match id {
			Some(id) => Ok(Some(self.get(&id).await?)),
			None => Ok(None),
		}
	}

	pub async fn add_member(
		&self,
		organization_id: &str,
		user_id: &str,
		role: MemberRole,
	) -> Result<Organization, OrganizationError> {
		if role == MemberRole::Owner {
			return Err(OrganizationError::Invalid(
				"an organization has exactly one owner".into(),
			));
		}
		self.modify(organization_id, |organization| {
			if organization.member(user_id).is_some() {
				return Err(OrganizationError::AlreadyMember(user_id.to_string()));
			}
			organization.members.push(Member {
				user_id: user_id.to_string(),
				role,
				joined_at: current_timestamp(),
			});
			Ok(())
		})
		.await
	}

	pub async fn remove_member(
		&self,
		organization_id: &str,
		user_id: &str,
	) -> Result<Organization, OrganizationError> {
		self.modify(organization_id, |organization| {
			if organization.owner_id == user_id {
				return Err(OrganizationError::OwnerRemoval);
			}
			let before = organization.members.len();
			organization.members.retain(|m| m.user_id != user_id);
			if organization.members.len() == before {
				return Err(OrganizationError::NotMember(user_id.to_string()));
			}
			Ok(())
		})
		.await
	}

	async fn modify<F>(&self, organization_id: &str, f: F) -> Result<Organization, OrganizationError>
	where
		F: FnOnce(&mut Organization) -> Result<(), OrganizationError>,
	{
		self.storage
			.modify(StorageKey::Organizations.as_str(), organization_id, f)
			.await
			.map_err(|e| match e {
				OrganizationError::Storage(StorageError::NotFound) => {
					OrganizationError::NotFound(organization_id.to_string())
				},
				other => other,
			})
	}
}
