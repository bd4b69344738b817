//! Storage for the cipherflow agents.
//!
//! A small key/value seam ([`StorageInterface`]) with file and in-memory
//! backends, a typed JSON wrapper ([`StorageService`]), and the two stores the
//! agents own: the [`DedupCache`] and the capped [`TelemetryLog`].

use async_trait::async_trait;
use cipherflow_types::ConfigSchema;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod dedup;
pub mod telemetry;

pub use dedup::DedupCache;
pub use telemetry::TelemetryLog;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level byte store.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait StorageInterface: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores bytes, replacing any previous value. `ttl` is advisory.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deleting a missing key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Every storage backend, by config name.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::NAME, file::create_storage as StorageFactory),
		(memory::NAME, memory::create_storage as StorageFactory),
	]
}

/// Typed JSON view over a [`StorageInterface`].
///
/// Values live under `"{namespace}:{id}"`.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes = serde_json::to_vec_pretty(data)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Like [`retrieve`](Self::retrieve) but maps a missing key to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound(_)) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Checkpoint {
		block: u64,
		label: String,
	}

	#[tokio::test]
	async fn test_typed_round_trip_and_missing_keys() {
		let service = StorageService::new(Box::new(MemoryStorage::new()));
		let checkpoint = Checkpoint {
			block: 12,
			label: "sweep".into(),
		};

		service.store("checkpoints", "executor", &checkpoint).await.unwrap();
		assert!(service.exists("checkpoints", "executor").await.unwrap());

		let loaded: Checkpoint = service.retrieve("checkpoints", "executor").await.unwrap();
		assert_eq!(loaded, checkpoint);

		let missing: Option<Checkpoint> = service
			.retrieve_optional("checkpoints", "solver")
			.await
			.unwrap();
		assert!(missing.is_none());

		service.remove("checkpoints", "executor").await.unwrap();
		assert!(matches!(
			service.retrieve::<Checkpoint>("checkpoints", "executor").await,
			Err(StorageError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_corrupt_value_is_a_serialization_error() {
		let mut backend = MockStorageInterface::new();
		backend
			.expect_get_bytes()
			.returning(|_| Box::pin(async move { Ok(b"{not json".to_vec()) }));

		let service = StorageService::new(Box::new(backend));
		assert!(matches!(
			service.retrieve::<Checkpoint>("checkpoints", "x").await,
			Err(StorageError::Serialization(_))
		));
	}

	#[test]
	fn test_registry_lists_backends() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["file", "memory"]);
	}
}
