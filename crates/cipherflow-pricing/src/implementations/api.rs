//! Quote endpoint plumbing shared by the priced connectors.

use crate::ConnectorError;
use alloy::primitives::{Address, Bytes, U256};
use cipherflow_types::utils::{amount, parse_amount};
use cipherflow_types::{
	current_timestamp_millis, parse_address, ChainId, ConfigSchema, Field, FieldType, QuoteLeg,
	QuoteResult, Schema, ValidationError, Venue,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

pub(crate) struct PricedConnectorSchema;

impl ConfigSchema for PricedConnectorSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("api_url", FieldType::Url),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(60),
					},
				),
			],
		)
		.validate(config)
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiQuote {
	#[serde(with = "amount")]
	amount_out: U256,
	#[serde(default)]
	target: Option<String>,
	#[serde(default)]
	call_data: Option<String>,
	#[serde(default)]
	gas_estimate: Option<Value>,
	#[serde(default)]
	bridge_fee: Option<Value>,
	#[serde(default)]
	warnings: Vec<String>,
}

pub(crate) struct QuoteApi {
	client: reqwest::Client,
	url: String,
}

/// Builds the client when `api_url` is set. Validates `config` either way.
pub(crate) fn from_config(config: &toml::Value) -> Result<Option<QuoteApi>, ConnectorError> {
	PricedConnectorSchema
		.validate(config)
		.map_err(|e| ConnectorError::Configuration(e.to_string()))?;

	let Some(url) = config.get("api_url").and_then(|v| v.as_str()) else {
		return Ok(None);
	};
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	let client = reqwest::Client::builder()
		.timeout(Duration::from_secs(timeout))
		.build()
		.map_err(|e| ConnectorError::Configuration(e.to_string()))?;

	Ok(Some(QuoteApi {
		client,
		url: url.to_string(),
	}))
}

fn optional_amount(value: Option<Value>, field: &str) -> Result<Option<U256>, ConnectorError> {
	match value {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(s)) => parse_amount(&s)
			.map(Some)
			.map_err(|e| ConnectorError::Parse(format!("{}: {}", field, e))),
		Some(Value::Number(n)) => parse_amount(&n.to_string())
			.map(Some)
			.map_err(|e| ConnectorError::Parse(format!("{}: {}", field, e))),
		Some(other) => Err(ConnectorError::Parse(format!(
			"{} is not an amount: {}",
			field, other
		))),
	}
}

impl QuoteApi {
	/// GETs a quote with `params` and maps it onto a leg for `venue`.
	pub(crate) async fn fetch(
		&self,
		venue: Venue,
		chain_id: ChainId,
		params: &[(&str, String)],
		default_gas: u64,
	) -> Result<QuoteResult, ConnectorError> {
		let response = self
			.client
			.get(&self.url)
			.query(params)
			.send()
			.await
			.map_err(|e| ConnectorError::Http(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			return Err(ConnectorError::Http(format!("status {}", status)));
		}

		let quote: ApiQuote = response
			.json()
			.await
			.map_err(|e| ConnectorError::Parse(e.to_string()))?;

		let call_data = match quote.call_data.as_deref() {
			None | Some("") => Bytes::new(),
			Some(raw) => raw
				.parse::<Bytes>()
				.map_err(|e| ConnectorError::Parse(format!("callData: {}", e)))?,
		};
		let target = quote
			.target
			.as_deref()
			.and_then(parse_address)
			.unwrap_or(Address::ZERO);

		let mut context = Map::new();
		context.insert("api".to_string(), Value::String(venue.as_str().to_string()));

		Ok(QuoteResult {
			leg: QuoteLeg {
				venue,
				chain_id,
				expected_amount_out: quote.amount_out,
				gas_estimate: optional_amount(quote.gas_estimate, "gasEstimate")?
					.unwrap_or(U256::from(default_gas)),
				target,
				call_data,
				bridge_fee: optional_amount(quote.bridge_fee, "bridgeFee")?.unwrap_or_default(),
				context,
			},
			quote_timestamp: current_timestamp_millis(),
			warnings: quote.warnings,
		})
	}
}

/// Canned answer used when no endpoint is configured or it fails.
pub(crate) fn stub_quote(
	venue: Venue,
	chain_id: ChainId,
	amount_out: U256,
	gas: u64,
	warning: &str,
) -> QuoteResult {
	let mut context = Map::new();
	context.insert(
		"note".to_string(),
		Value::String(format!("stubbed {} quote", venue)),
	);
	QuoteResult {
		leg: QuoteLeg {
			venue,
			chain_id,
			expected_amount_out: amount_out,
			gas_estimate: U256::from(gas),
			target: Address::ZERO,
			call_data: Bytes::new(),
			bridge_fee: U256::ZERO,
			context,
		},
		quote_timestamp: current_timestamp_millis(),
		warnings: vec![warning.to_string()],
	}
}
