//! Operator-curated feed of already normalized intents.

use super::http::{normalize_items, HttpFetcher, HttpSourceSchema};
use crate::{IntentSourceInterface, SourceError};
use async_trait::async_trait;
use cipherflow_types::{ConfigSchema, IntentSourceKind, NormalizedIntent};
use serde_json::Value;

pub struct ManualSource {
	fetcher: HttpFetcher,
}

/// Items are in normalized shape already; whatever `source` they claim is
/// replaced with `manual`.
fn parse_item(item: Value) -> Result<NormalizedIntent, String> {
	let Value::Object(mut fields) = item else {
		return Err("intent is not an object".to_string());
	};
	fields.insert(
		"source".to_string(),
		Value::String(IntentSourceKind::Manual.as_str().to_string()),
	);
	serde_json::from_value(Value::Object(fields)).map_err(|e| e.to_string())
}

#[async_trait]
impl IntentSourceInterface for ManualSource {
	fn kind(&self) -> IntentSourceKind {
		IntentSourceKind::Manual
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpSourceSchema)
	}

	async fn pull_intents(&self) -> Result<Vec<NormalizedIntent>, SourceError> {
		let items = self.fetcher.fetch_items().await?;
		Ok(normalize_items(IntentSourceKind::Manual, items, parse_item))
	}
}

pub fn create_source(config: &toml::Value) -> Result<Box<dyn IntentSourceInterface>, SourceError> {
	Ok(Box::new(ManualSource {
		fetcher: HttpFetcher::from_config(config, "intents")?,
	}))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "manual";

	pub fn factory() -> crate::SourceFactory {
		create_source
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_source_is_forced_to_manual() {
		let intent = parse_item(json!({
			"externalId": "m-1",
			"trader": "0x00000000000000000000000000000000000000d1",
			"fromToken": "ETH",
			"toToken": "USDC",
			"amountIn": "10",
			"minAmountOut": 9,
			"source": "cow"
		}))
		.unwrap();
		assert_eq!(intent.source, IntentSourceKind::Manual);
		assert_eq!(intent.dedup_key(), "manual:m-1");
	}

	#[test]
	fn test_negative_amount_is_rejected() {
		let parsed = parse_item(json!({
			"externalId": "m-2",
			"trader": "0x00000000000000000000000000000000000000d1",
			"fromToken": "ETH",
			"toToken": "USDC",
			"amountIn": "-10",
			"minAmountOut": "0"
		}));
		assert!(parsed.is_err());
		assert!(parse_item(json!("m-3")).is_err());
	}

	#[test]
	fn test_bad_endpoint_is_a_configuration_error() {
		let config: toml::Value = toml::from_str(r#"endpoint = "ftp://feed""#).unwrap();
		assert!(matches!(
			create_source(&config),
			Err(SourceError::Configuration(_))
		));
	}
}
