//! Curve stable-swap quotes.

use super::api::{self, PricedConnectorSchema, QuoteApi};
use crate::{ConnectorError, QuoteConnector};
use alloy::primitives::U256;
use async_trait::async_trait;
use cipherflow_types::{ChainId, ConfigSchema, QuoteRequest, QuoteResult, Venue};
use tracing::warn;

const SUPPORTED_CHAINS: [ChainId; 6] = [1, 10, 137, 42161, 8453, 84532];
const API_DEFAULT_GAS: u64 = 220_000;
const STUB_GAS: u64 = 210_000;

pub struct CurveConnector {
	api: Option<QuoteApi>,
}

impl CurveConnector {
	fn stub(&self, request: &QuoteRequest) -> QuoteResult {
		let amount_out = request.amount_in.saturating_mul(U256::from(997u64)) / U256::from(1000u64);
		api::stub_quote(
			Venue::Curve,
			request.chain_id,
			amount_out,
			STUB_GAS,
			"Curve connector returns stub data",
		)
	}
}

#[async_trait]
impl QuoteConnector for CurveConnector {
	fn venue(&self) -> Venue {
		Venue::Curve
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
			("chainId", request.chain_id.to_string()),
			("fromToken", request.from_token.clone()),
			("toToken", request.to_token.clone()),
			("amount", request.amount_in.to_string()),
		];
		match api
			.fetch(Venue::Curve, request.chain_id, &params, API_DEFAULT_GAS)
			.await
		{
			Ok(quote) => Ok(Some(quote)),
			Err(e) => {
				warn!(venue = "curve", error = %e, "quote api failed, using stub");
				Ok(Some(self.stub(request)))
			}
		}
	}
}

pub fn create_connector(config: &toml::Value) -> Result<Box<dyn QuoteConnector>, ConnectorError> {
	Ok(Box::new(CurveConnector {
		api: api::from_config(config)?,
	}))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "curve";

	pub fn factory() -> crate::ConnectorFactory {
		create_connector
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use wiremock::matchers::{method, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn request() -> QuoteRequest {
		QuoteRequest {
			chain_id: 137,
			from_token: "USDC".into(),
			to_token: "DAI".into(),
			amount_in: U256::from(10_000u64),
			slippage_bps: None,
			deadline: Some(1_900_000_000),
			destination_chain_id: None,
		}
	}

	#[tokio::test]
	async fn test_stub_without_api() {
		let connector = create_connector(&toml::Value::Table(Default::default())).unwrap();
		let quote = connector.get_quote(&request()).await.unwrap().unwrap();
		assert_eq!(quote.leg.expected_amount_out, U256::from(9_970u64));
		assert_eq!(quote.leg.gas_estimate, U256::from(STUB_GAS));
		assert_eq!(quote.warnings, vec!["Curve connector returns stub data"]);
	}

	#[tokio::test]
	async fn test_api_uses_amount_param_and_gas_default() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(query_param("amount", "10000"))
			.and(query_param("chainId", "137"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"amountOut": 9_999,
				"warnings": ["thin pool"]
			})))
			.mount(&server)
			.await;

		let config: toml::Value =
			toml::from_str(&format!(r#"api_url = "{}""#, server.uri())).unwrap();
		let quote = create_connector(&config)
			.unwrap()
			.get_quote(&request())
			.await
			.unwrap()
			.unwrap();

		assert_eq!(quote.leg.expected_amount_out, U256::from(9_999u64));
		assert_eq!(quote.leg.gas_estimate, U256::from(API_DEFAULT_GAS));
		assert_eq!(quote.warnings, vec!["thin pool"]);
	}

	#[test]
	fn test_rejects_bad_url() {
		let config: toml::Value = toml::from_str(r#"api_url = "not a url""#).unwrap();
		assert!(matches!(
			create_connector(&config),
			Err(ConnectorError::Configuration(_))
		));
	}
}
