//! In-memory storage backend, used by tests and `storage.primary = "memory"`.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use cipherflow_types::{ConfigSchema, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const NAME: &str = "memory";

struct StorageEntry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl StorageEntry {
	fn is_live(&self) -> bool {
		self.expires_at.map_or(true, |at| Instant::now() < at)
	}
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, StorageEntry>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		match store.get(key) {
			Some(entry) if entry.is_live() => Ok(entry.value.clone()),
			_ => Err(StorageError::NotFound(key.to_string())),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(
			key.to_string(),
			StorageEntry {
				value,
				expires_at: ttl.map(|ttl| Instant::now() + ttl),
			},
		);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.store.write().await.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store.get(key).is_some_and(StorageEntry::is_live))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = NAME;

	pub fn factory() -> crate::StorageFactory {
		create_storage
	}
}
