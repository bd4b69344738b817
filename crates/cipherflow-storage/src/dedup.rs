//! Seen-key cache shared by ingestion and the publisher.
//!
//! Membership means "already forwarded" (ingestion) or "already registered"
//! (publisher). Keys optionally expire after a TTL and can be persisted as an
//! ordered JSON list so the publisher survives restarts.

use crate::{StorageError, StorageService};
use cipherflow_types::current_timestamp_millis;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

const NAMESPACE: &str = "dedup";

#[derive(Default)]
struct Entries {
	seen: HashMap<String, u64>,
	order: VecDeque<String>,
}

struct Persistence {
	storage: Arc<StorageService>,
	id: String,
}

pub struct DedupCache {
	ttl: Option<Duration>,
	entries: Mutex<Entries>,
	persistence: Option<Persistence>,
}

impl DedupCache {
	/// Process-local cache whose keys expire after `ttl`.
	pub fn in_memory(ttl: Duration) -> Self {
		Self {
			ttl: Some(ttl),
			entries: Mutex::new(Entries::default()),
			persistence: None,
		}
	}

	/// Cache backed by `storage` under `dedup:{id}`.
	///
	/// Previously persisted keys are loaded and stamped with the current time.
	/// A missing or unreadable record starts an empty cache.
	pub async fn persistent(
		storage: Arc<StorageService>,
		id: impl Into<String>,
		ttl: Option<Duration>,
	) -> Self {
		let id = id.into();
		let mut entries = Entries::default();

		match storage.retrieve_optional::<Vec<String>>(NAMESPACE, &id).await {
			Ok(Some(keys)) => {
				let now = current_timestamp_millis();
				for key in keys {
					if entries.seen.insert(key.clone(), now).is_none() {
						entries.order.push_back(key);
					}
				}
				debug!(cache = %id, keys = entries.order.len(), "loaded dedup cache");
			}
			Ok(None) => {}
			Err(e) => warn!(cache = %id, error = %e, "failed to load dedup cache, starting empty"),
		}

		Self {
			ttl,
			entries: Mutex::new(entries),
			persistence: Some(Persistence { storage, id }),
		}
	}

	fn lock(&self) -> MutexGuard<'_, Entries> {
		self.entries.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn has(&self, key: &str) -> bool {
		self.lock().seen.contains_key(key)
	}

	/// Records `key`. Returns `false` if it was already present.
	pub fn add(&self, key: impl Into<String>) -> bool {
		let key = key.into();
		let mut entries = self.lock();
		if entries.seen.contains_key(&key) {
			return false;
		}
		entries.seen.insert(key.clone(), current_timestamp_millis());
		entries.order.push_back(key);
		true
	}

	/// Evicts entries older than the TTL. Returns how many were removed.
	pub fn prune(&self) -> usize {
		self.prune_at(current_timestamp_millis())
	}

	/// Like [`prune`](Self::prune) with an explicit clock, in milliseconds.
	pub fn prune_at(&self, now_ms: u64) -> usize {
		let Some(ttl) = self.ttl else {
			return 0;
		};
		let ttl_ms = ttl.as_millis() as u64;

		let mut entries = self.lock();
		let Entries { seen, order } = &mut *entries;
		let before = order.len();
		order.retain(|key| {
			let expired = seen
				.get(key)
				.map_or(true, |at| now_ms.saturating_sub(*at) > ttl_ms);
			if expired {
				seen.remove(key);
			}
			!expired
		});
		before - order.len()
	}

	/// Keys in insertion order.
	pub fn keys(&self) -> Vec<String> {
		self.lock().order.iter().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.lock().order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Rewrites the persisted key list. No-op for in-memory caches.
	pub async fn persist(&self) -> Result<(), StorageError> {
		let Some(persistence) = &self.persistence else {
			return Ok(());
		};
		let keys = self.keys();
		persistence
			.storage
			.store(NAMESPACE, &persistence.id, &keys)
			.await
	}
}
