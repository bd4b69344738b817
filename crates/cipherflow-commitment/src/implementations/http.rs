//! Time-lock encryption through a remote encryption endpoint.

use crate::{TimelockError, TimelockInterface};
use async_trait::async_trait;
use cipherflow_types::{Ciphertext, ConfigSchema, Field, FieldType, Schema, ValidationError};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECONDS: u64 = 15;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptRequest<'a> {
	/// 0x-prefixed hex of the plaintext.
	message: String,
	block_height: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	subscription_id: Option<&'a str>,
}

pub struct HttpTimelock {
	client: reqwest::Client,
	endpoint: String,
	api_key: Option<String>,
	subscription_id: Option<String>,
}

#[async_trait]
impl TimelockInterface for HttpTimelock {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpTimelockSchema)
	}

	async fn encrypt(&self, plaintext: &[u8], target_block: u64) -> Result<Ciphertext, TimelockError> {
		let body = EncryptRequest {
			message: format!("0x{}", hex::encode(plaintext)),
			block_height: target_block.to_string(),
			subscription_id: self.subscription_id.as_deref(),
		};

		let mut request = self.client.post(&self.endpoint).json(&body);
		if let Some(key) = &self.api_key {
			request = request.header("x-api-key", key);
		}

		let response = request
			.send()
			.await
			.map_err(|e| TimelockError::Encryption(e.to_string()))?;
		let status = response.status();
		if !status.is_success() {
			return Err(TimelockError::Encryption(format!(
				"encryption endpoint returned {}",
				status
			)));
		}

		let ciphertext: Ciphertext = response
			.json()
			.await
			.map_err(|e| TimelockError::Encryption(format!("malformed ciphertext: {}", e)))?;
		debug!(target_block, bytes = plaintext.len(), "payload sealed");
		Ok(ciphertext)
	}
}

pub struct HttpTimelockSchema;

impl ConfigSchema for HttpTimelockSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("endpoint", FieldType::Url)],
			vec![
				Field::new("api_key", FieldType::String),
				Field::new("subscription_id", FieldType::String),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(120),
					},
				),
			],
		)
		.validate(config)
	}
}

/// - `endpoint` (required): encryption service URL
/// - `api_key`, `subscription_id` (optional): forwarded with each request
/// - `timeout_seconds` (optional, default 15)
pub fn create_timelock(config: &toml::Value) -> Result<Box<dyn TimelockInterface>, TimelockError> {
	HttpTimelockSchema
		.validate(config)
		.map_err(|e| TimelockError::Configuration(e.to_string()))?;

	let text = |key: &str| config.get(key).and_then(|v| v.as_str()).map(str::to_string);
	let endpoint = text("endpoint")
		.ok_or_else(|| TimelockError::Configuration("endpoint is required".to_string()))?;
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	let client = reqwest::Client::builder()
		.timeout(Duration::from_secs(timeout))
		.build()
		.map_err(|e| TimelockError::Configuration(e.to_string()))?;

	Ok(Box::new(HttpTimelock {
		client,
		endpoint,
		api_key: text("api_key"),
		subscription_id: text("subscription_id"),
	}))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "http";

	pub fn factory() -> crate::TimelockFactory {
		create_timelock
	}
}
