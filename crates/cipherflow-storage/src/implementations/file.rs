//! File-based storage backend.
//!
//! One file per key under a base directory. Writes go to a temporary file
//! which is then renamed over the target so readers never see a torn value.
//! TTLs are accepted but not enforced.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use cipherflow_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

pub const NAME: &str = "file";

pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.json", safe_key))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);
		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				Err(StorageError::NotFound(key.to_string()))
			}
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		_ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		match fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some("") => Err("storage_path must not be empty".to_string()),
					_ => Ok(()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Builds a [`FileStorage`] from its TOML table.
///
/// - `storage_path` (optional, default `./data/storage`)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = NAME;

	pub fn factory() -> crate::StorageFactory {
		create_storage
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_set_get_delete() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage
			.set_bytes("telemetry:solver", b"[]".to_vec(), None)
			.await
			.unwrap();
		assert!(storage.exists("telemetry:solver").await.unwrap());
		assert_eq!(storage.get_bytes("telemetry:solver").await.unwrap(), b"[]");
		assert!(dir.path().join("telemetry_solver.json").exists());

		storage.delete("telemetry:solver").await.unwrap();
		storage.delete("telemetry:solver").await.unwrap();
		assert!(!storage.exists("telemetry:solver").await.unwrap());
		assert!(matches!(
			storage.get_bytes("telemetry:solver").await,
			Err(StorageError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_missing_directory_is_created_on_write() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().join("nested").join("state"));

		storage
			.set_bytes("dedup:publisher", b"[\"cow:1\"]".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(
			storage.get_bytes("dedup:publisher").await.unwrap(),
			b"[\"cow:1\"]"
		);
	}

	#[test]
	fn test_factory_rejects_empty_path() {
		let config: toml::Value = toml::from_str(r#"storage_path = """#).unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(_))
		));

		let config: toml::Value = toml::from_str(r#"storage_path = "./tmp""#).unwrap();
		assert!(create_storage(&config).is_ok());
	}
}
