//! Uniswap connector. Quotes are derived from a fixed 0.5% haircut.

use super::api;
use crate::{ConnectorError, QuoteConnector};
use alloy::primitives::U256;
use async_trait::async_trait;
use cipherflow_types::{
	ChainId, ConfigSchema, QuoteRequest, QuoteResult, Schema, ValidationError, Venue,
};

const SUPPORTED_CHAINS: [ChainId; 5] = [1, 10, 42161, 8453, 84532];
const STUB_GAS: u64 = 180_000;

pub struct UniswapSchema;

impl ConfigSchema for UniswapSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub struct UniswapConnector;

#[async_trait]
impl QuoteConnector for UniswapConnector {
	fn venue(&self) -> Venue {
		Venue::Uniswap
	}

	fn supported_chains(&self) -> Vec<ChainId> {
		SUPPORTED_CHAINS.to_vec()
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(UniswapSchema)
	}

	async fn get_quote(&self, request: &QuoteRequest) -> Result<Option<QuoteResult>, ConnectorError> {
		request.validate()?;
		if !SUPPORTED_CHAINS.contains(&request.chain_id) {
			return Ok(None);
		}

		let amount_out = request.amount_in.saturating_mul(U256::from(995u64)) / U256::from(1000u64);
		Ok(Some(api::stub_quote(
			Venue::Uniswap,
			request.chain_id,
			amount_out,
			STUB_GAS,
			"Uniswap connector returns stub data",
		)))
	}
}

pub fn create_connector(config: &toml::Value) -> Result<Box<dyn QuoteConnector>, ConnectorError> {
	UniswapSchema
		.validate(config)
		.map_err(|e| ConnectorError::Configuration(e.to_string()))?;
	Ok(Box::new(UniswapConnector))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "uniswap";

	pub fn factory() -> crate::ConnectorFactory {
		create_connector
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_haircut_quote() {
		let request = QuoteRequest {
			chain_id: 10,
			from_token: "WETH".into(),
			to_token: "USDC".into(),
			amount_in: U256::from(2_000u64),
			slippage_bps: Some(50),
			deadline: None,
			destination_chain_id: None,
		};
		let quote = UniswapConnector.get_quote(&request).await.unwrap().unwrap();
		assert_eq!(quote.leg.expected_amount_out, U256::from(1_990u64));
		assert_eq!(quote.leg.gas_estimate, U256::from(STUB_GAS));
		assert_eq!(quote.leg.chain_id, 10);

		let unsupported = QuoteRequest {
			chain_id: 137,
			..request
		};
		assert!(UniswapConnector.get_quote(&unsupported).await.unwrap().is_none());
	}
}
