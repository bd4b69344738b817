//! Aerodrome quotes on Base.

use super::api::{self, PricedConnectorSchema, QuoteApi};
use crate::{ConnectorError, QuoteConnector};
use async_trait::async_trait;
use cipherflow_types::{ChainId, ConfigSchema, QuoteRequest, QuoteResult, Venue};
use tracing::{debug, warn};

const SUPPORTED_CHAINS: [ChainId; 2] = [84532, 8453];
const API_DEFAULT_GAS: u64 = 180_000;
const STUB_GAS: u64 = 150_000;

pub struct AerodromeConnector {
	api: Option<QuoteApi>,
}

impl AerodromeConnector {
	fn stub(&self, request: &QuoteRequest) -> QuoteResult {
		api::stub_quote(
			Venue::Aerodrome,
			request.chain_id,
			request.amount_in,
			STUB_GAS,
			"Aerodrome connector returns stub data",
		)
	}
}

#[async_trait]
impl QuoteConnector for AerodromeConnector {
	fn venue(&self) -> Venue {
		Venue::Aerodrome
	}

	fn supported_chains(&self) -> Vec<ChainId> {
		SUPPORTED_CHAINS.to_vec()
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(PricedConnectorSchema)
	}

	async fn get_quote(&self, request: &QuoteRequest) -> Result<Option<QuoteResult>, ConnectorError> {
		request.validate()?;
		if !SUPPORTED_CHAINS.contains(&request.chain_id) {
			return Ok(None);
		}

		let Some(api) = &self.api else {
			return Ok(Some(self.stub(request)));
		};

		let params = [
			("fromToken", request.from_token.clone()),
			("toToken", request.to_token.clone()),
			("amountIn", request.amount_in.to_string()),
			("chainId", request.chain_id.to_string()),
		];
		match api
			.fetch(Venue::Aerodrome, request.chain_id, &params, API_DEFAULT_GAS)
			.await
		{
			Ok(quote) => {
				debug!(venue = "aerodrome", amount_out = %quote.leg.expected_amount_out, "api quote");
				Ok(Some(quote))
			}
			Err(e) => {
				warn!(venue = "aerodrome", error = %e, "quote api failed, using stub");
				Ok(Some(self.stub(request)))
			}
		}
	}
}

/// - `api_url` (optional): quote endpoint; without it quotes are stubbed
/// - `timeout_seconds` (optional, default 10)
pub fn create_connector(config: &toml::Value) -> Result<Box<dyn QuoteConnector>, ConnectorError> {
	Ok(Box::new(AerodromeConnector {
		api: api::from_config(config)?,
	}))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "aerodrome";

	pub fn factory() -> crate::ConnectorFactory {
		create_connector
	}
}
