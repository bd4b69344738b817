//! Bridge connector backed by configured routes, for testnets and demos.
//!
//! Each route is keyed by the chain it quotes on and reports the venue on
//! the far side of the bridge, so the planner sees it as that venue.

use crate::{ConnectorError, QuoteConnector};
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use cipherflow_types::utils::amount;
use cipherflow_types::{
	current_timestamp_millis, parse_address, ChainId, ConfigSchema, Field, FieldType, QuoteLeg,
	QuoteRequest, QuoteResult, Schema, ValidationError, Venue,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeRoute {
	pub destination_venue: Venue,
	pub chain_id: ChainId,
	#[serde(with = "amount")]
	pub expected_amount_out: U256,
	#[serde(with = "amount")]
	pub gas_estimate: U256,
	#[serde(default, with = "optional_amount")]
	pub bridge_fee: Option<U256>,
	#[serde(default)]
	pub context: Option<Map<String, Value>>,
}

mod optional_amount {
	use alloy::primitives::U256;
	use serde::{Deserialize, Deserializer};

	#[derive(Deserialize)]
	struct Wrapped(#[serde(with = "cipherflow_types::utils::amount")] U256);

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
		Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(v)| v))
	}
}

pub struct MockBridgeSchema;

impl ConfigSchema for MockBridgeSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let route = Schema::new(
			vec![
				Field::new("destination_venue", FieldType::String),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![Field::new("context", FieldType::Table(Schema::new(vec![], vec![])))],
		);
		Schema::new(
			vec![],
			vec![Field::new(
				"routes",
				FieldType::Array(Box::new(FieldType::Table(route))),
			)],
		)
		.validate(config)
	}
}

pub struct MockBridgeConnector {
	routes: HashMap<ChainId, BridgeRoute>,
}

impl MockBridgeConnector {
	pub fn new(routes: impl IntoIterator<Item = BridgeRoute>) -> Self {
		Self {
			routes: routes.into_iter().map(|r| (r.chain_id, r)).collect(),
		}
	}
}

#[async_trait]
impl QuoteConnector for MockBridgeConnector {
	fn venue(&self) -> Venue {
		Venue::MockBridge
	}

	fn supported_chains(&self) -> Vec<ChainId> {
		let mut chains: Vec<ChainId> = self.routes.keys().copied().collect();
		chains.sort_unstable();
		chains
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockBridgeSchema)
	}

	async fn get_quote(&self, request: &QuoteRequest) -> Result<Option<QuoteResult>, ConnectorError> {
		request.validate()?;
		let Some(route) = self.routes.get(&request.chain_id) else {
			return Ok(None);
		};

		Ok(Some(QuoteResult {
			leg: QuoteLeg {
				venue: route.destination_venue,
				chain_id: route.chain_id,
				expected_amount_out: route.expected_amount_out,
				gas_estimate: route.gas_estimate,
				target: parse_address(&request.to_token).unwrap_or(Address::ZERO),
				call_data: Bytes::new(),
				bridge_fee: route.bridge_fee.unwrap_or_default(),
				context: route.context.clone().unwrap_or_default(),
			},
			quote_timestamp: current_timestamp_millis(),
			warnings: vec!["Using mock bridge connector".to_string()],
		}))
	}
}

/// - `routes` (optional): array of `{destination_venue, chain_id,
///   expected_amount_out, gas_estimate, bridge_fee?, context?}`
pub fn create_connector(config: &toml::Value) -> Result<Box<dyn QuoteConnector>, ConnectorError> {
	MockBridgeSchema
		.validate(config)
		.map_err(|e| ConnectorError::Configuration(e.to_string()))?;

	let routes: Vec<BridgeRoute> = match config.get("routes") {
		Some(routes) => routes
			.clone()
			.try_into()
			.map_err(|e: toml::de::Error| ConnectorError::Configuration(e.to_string()))?,
		None => Vec::new(),
	};

	Ok(Box::new(MockBridgeConnector::new(routes)))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "mock-bridge";

	pub fn factory() -> crate::ConnectorFactory {
		create_connector
	}
}
