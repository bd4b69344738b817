//! GET-and-unwrap plumbing shared by the HTTP sources.

use crate::SourceError;
use cipherflow_types::{
	ConfigSchema, Field, FieldType, IntentSourceKind, NormalizedIntent, Schema, ValidationError,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

pub(crate) struct HttpSourceSchema;

impl ConfigSchema for HttpSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("endpoint", FieldType::Url),
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

pub(crate) struct HttpFetcher {
	client: reqwest::Client,
	endpoint: Option<String>,
	/// Key of the list when the body is an object instead of a bare array.
	wrapper_key: &'static str,
}

impl HttpFetcher {
	pub(crate) fn from_config(
		config: &toml::Value,
		wrapper_key: &'static str,
	) -> Result<Self, SourceError> {
		HttpSourceSchema
			.validate(config)
			.map_err(|e| SourceError::Configuration(e.to_string()))?;

		let endpoint = config
			.get("endpoint")
			.and_then(|v| v.as_str())
			.map(str::to_string);
		let timeout = config
			.get("timeout_seconds")
			.and_then(|v| v.as_integer())
			.map(|v| v as u64)
			.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(timeout))
			.build()
			.map_err(|e| SourceError::Configuration(e.to_string()))?;

		Ok(Self {
			client,
			endpoint,
			wrapper_key,
		})
	}

	/// Raw list items. No endpoint means no request and no items.
	pub(crate) async fn fetch_items(&self) -> Result<Vec<Value>, SourceError> {
		let Some(endpoint) = &self.endpoint else {
			return Ok(Vec::new());
		};

		let response = self
			.client
			.get(endpoint)
			.send()
			.await
			.map_err(|e| SourceError::Http(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			return Err(SourceError::Status(status.to_string()));
		}

		let body: Value = response
			.json()
			.await
			.map_err(|e| SourceError::Parse(e.to_string()))?;

		match body {
			Value::Array(items) => Ok(items),
			Value::Object(mut map) => match map.remove(self.wrapper_key) {
				Some(Value::Array(items)) => Ok(items),
				None | Some(Value::Null) => Ok(Vec::new()),
				Some(other) => Err(SourceError::Parse(format!(
					"'{}' is not a list: {}",
					self.wrapper_key, other
				))),
			},
			Value::Null => Ok(Vec::new()),
			other => Err(SourceError::Parse(format!("unexpected body: {}", other))),
		}
	}
}

/// Maps every raw item with `map` and keeps those that pass validation.
pub(crate) fn normalize_items<F>(
	source: IntentSourceKind,
	items: Vec<Value>,
	map: F,
) -> Vec<NormalizedIntent>
where
	F: Fn(Value) -> Result<NormalizedIntent, String>,
{
	let total = items.len();
	let intents: Vec<NormalizedIntent> = items
		.into_iter()
		.filter_map(|item| match map(item).and_then(|intent| {
			intent.validate().map_err(|e| e.to_string())?;
			Ok(intent)
		}) {
			Ok(intent) => Some(intent),
			Err(error) => {
				warn!(source = %source, %error, "dropping malformed intent");
				None
			}
		})
		.collect();

	debug!(source = %source, total, accepted = intents.len(), "normalized source batch");
	intents
}
