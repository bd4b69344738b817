//! Capped, newest-first log of commitment attempts.

use crate::StorageService;
use cipherflow_types::TelemetryEntry;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

const NAMESPACE: &str = "telemetry";

pub const DEFAULT_TELEMETRY_CAPACITY: usize = 50;

pub struct TelemetryLog {
	capacity: usize,
	entries: Mutex<VecDeque<TelemetryEntry>>,
	storage: Option<(Arc<StorageService>, String)>,
}

impl TelemetryLog {
	pub fn in_memory(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			entries: Mutex::new(VecDeque::new()),
			storage: None,
		}
	}

	/// Opens the log persisted under `telemetry:{id}`, keeping any entries a
	/// previous run left behind.
	pub async fn persistent(
		capacity: usize,
		storage: Arc<StorageService>,
		id: impl Into<String>,
	) -> Self {
		let id = id.into();
		let capacity = capacity.max(1);
		let mut entries = match storage
			.retrieve_optional::<Vec<TelemetryEntry>>(NAMESPACE, &id)
			.await
		{
			Ok(Some(entries)) => VecDeque::from(entries),
			Ok(None) => VecDeque::new(),
			Err(e) => {
				warn!(log = %id, error = %e, "failed to load telemetry, starting empty");
				VecDeque::new()
			}
		};
		entries.truncate(capacity);

		Self {
			capacity,
			entries: Mutex::new(entries),
			storage: Some((storage, id)),
		}
	}

	/// Prepends `entry`, drops the oldest past capacity and rewrites the
	/// persisted copy. Persistence failures are logged, never returned.
	pub async fn append(&self, entry: TelemetryEntry) {
		let snapshot: Vec<TelemetryEntry> = {
			let mut entries = self.entries.lock().await;
			entries.push_front(entry);
			entries.truncate(self.capacity);
			entries.iter().cloned().collect()
		};

		if let Some((storage, id)) = &self.storage {
			if let Err(e) = storage.store(NAMESPACE, id, &snapshot).await {
				warn!(log = %id, error = %e, "failed to persist telemetry");
			}
		}
	}

	/// Newest first.
	pub async fn list(&self) -> Vec<TelemetryEntry> {
		self.entries.lock().await.iter().cloned().collect()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::file::FileStorage;
	use alloy::primitives::U256;
	use cipherflow_types::{signed, ProfitReport, TelemetryStatus, Venue};
	use tempfile::TempDir;

	fn report() -> ProfitReport {
		ProfitReport {
			venue: Venue::Uniswap,
			amount_in: U256::from(1_000u64),
			amount_out: U256::from(1_010u64),
			gas_cost: U256::from(3u64),
			bridge_fee: U256::ZERO,
			net_profit: signed(U256::from(7u64)),
			quote_issued_at: 1,
			warnings: vec![],
		}
	}

	#[tokio::test]
	async fn test_newest_first_and_capped() {
		let log = TelemetryLog::in_memory(2);
		for intent_id in 1..=3u64 {
			log.append(TelemetryEntry::planned(intent_id, &report())).await;
		}

		let entries = log.list().await;
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].intent_id, "3");
		assert_eq!(entries[1].intent_id, "2");
	}

	#[tokio::test]
	async fn test_attempt_steps_share_an_id_and_persist() {
		let dir = TempDir::new().unwrap();
		let storage = Arc::new(StorageService::new(Box::new(FileStorage::new(
			dir.path().to_path_buf(),
		))));

		let log = TelemetryLog::persistent(50, storage.clone(), "solver").await;
		let planned = TelemetryEntry::planned(4, &report());
		log.append(planned.clone()).await;
		log.append(planned.failed("payload too large")).await;

		let reopened = TelemetryLog::persistent(50, storage, "solver").await;
		let entries = reopened.list().await;
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].status, TelemetryStatus::Failed);
		assert_eq!(entries[0].error.as_deref(), Some("payload too large"));
		assert_eq!(entries[1].status, TelemetryStatus::Planned);
		assert_eq!(entries[0].id, entries[1].id);
	}
}
