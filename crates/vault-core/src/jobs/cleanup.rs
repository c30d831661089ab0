//! Storage cleanup: drops entries whose TTL has elapsed, such as processed
//! webhook event ids.

use super::{Job, JobError, JobReport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use vault_storage::StorageService;

/// Removes expired entries from the document store.
pub struct StorageCleanupJob {
	storage: Arc<StorageService>,
	interval: Duration,
}

impl StorageCleanupJob {
	pub fn new(storage: Arc<StorageService>, interval: Duration) -> Self {
		Self { storage, interval }
	}
}

#[async_trait]
impl Job for StorageCleanupJob {
	fn name(&self) -> &'static str {
		"storage_cleanup"
	}

	fn interval(&self) -> Duration {
		self.interval
	}

	async fn run_once(&self) -> Result<JobReport, JobError> {
		let removed = self.storage.cleanup_expired().await?;
		if removed > 0 {
			tracing::debug!(removed, "Storage cleanup removed expired entries");
		}
		Ok(JobReport {
			processed: removed,
			succeeded: removed,
			..Default::default()
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use vault_storage::implementations::memory::MemoryStorage;
	use vault_types::StorageKey;

	#[tokio::test]
	async fn test_run_once_removes_expired_entries() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let events = StorageKey::WebhookEvents.as_str();
		storage
			.store_with_ttl(events, "evt_old", &"seen", Some(Duration::from_millis(20)))
			.await
			.unwrap();
		storage.store(events, "evt_kept", &"seen").await.unwrap();
		tokio::time::sleep(Duration::from_millis(40)).await;

		let job = StorageCleanupJob::new(storage.clone(), Duration::from_secs(3600));
		let report = job.run_once().await.unwrap();
		assert_eq!(report.processed, 1);
		assert_eq!(report.succeeded, 1);
		assert!(!storage.exists(events, "evt_old").await.unwrap());
		assert!(storage.exists(events, "evt_kept").await.unwrap());

		assert_eq!(job.run_once().await.unwrap().processed, 0);
	}
}
