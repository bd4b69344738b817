//! Best-route selection across every configured connector.

use crate::QuoteConnector;
use alloy::primitives::U256;
use cipherflow_types::{
	ProfitReport, QuoteRequest, QuoteResult, SwapIntentDefinition, Venue, DEFAULT_GAS_PRICE_WEI,
};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct RoutePlanner {
	connectors: Vec<Arc<dyn QuoteConnector>>,
	gas_price_wei: U256,
}

impl RoutePlanner {
	pub fn new(connectors: Vec<Arc<dyn QuoteConnector>>, gas_price_wei: U256) -> Self {
		Self {
			connectors,
			gas_price_wei,
		}
	}

	/// Gas price given in gwei, the unit config uses.
	pub fn with_gas_price_gwei(connectors: Vec<Arc<dyn QuoteConnector>>, gwei: u64) -> Self {
		Self::new(
			connectors,
			U256::from(gwei).saturating_mul(U256::from(1_000_000_000u64)),
		)
	}

	pub fn connectors(&self) -> &[Arc<dyn QuoteConnector>] {
		&self.connectors
	}

	pub fn gas_price_wei(&self) -> U256 {
		self.gas_price_wei
	}

	/// First connector registered for `venue`.
	pub fn connector_for(&self, venue: Venue) -> Option<Arc<dyn QuoteConnector>> {
		self.connectors
			.iter()
			.find(|c| c.venue() == venue)
			.cloned()
	}

	pub fn quote_request(intent: &SwapIntentDefinition) -> QuoteRequest {
		QuoteRequest {
			chain_id: intent.quote_chain_id(),
			from_token: intent.from_token.clone(),
			to_token: intent.to_token.clone(),
			amount_in: intent.amount_in,
			slippage_bps: None,
			deadline: intent.metadata.deadline,
			destination_chain_id: intent.destination_chain_id,
		}
	}

	/// Every successful quote, best first: highest net output, then lowest
	/// gas estimate. Connector errors are logged and left out.
	pub async fn collect_quotes(&self, request: &QuoteRequest) -> Vec<QuoteResult> {
		let results = join_all(self.connectors.iter().map(|connector| async move {
			(connector.venue(), connector.get_quote(request).await)
		}))
		.await;

		let mut quotes: Vec<QuoteResult> = results
			.into_iter()
			.filter_map(|(venue, result)| match result {
				Ok(quote) => quote,
				Err(e) => {
					warn!(%venue, error = %e, "connector failed");
					None
				}
			})
			.collect();

		let amount_in = request.amount_in;
		quotes.sort_by(|a, b| {
			b.net_amount(amount_in)
				.cmp(&a.net_amount(amount_in))
				.then_with(|| a.leg.gas_estimate.cmp(&b.leg.gas_estimate))
		});
		quotes
	}

	#[instrument(skip_all, fields(intent_id = intent.intent_id))]
	pub async fn plan_best_route(&self, intent: &SwapIntentDefinition) -> Option<ProfitReport> {
		let request = Self::quote_request(intent);
		let Some(best) = self.collect_quotes(&request).await.into_iter().next() else {
			warn!(chain_id = request.chain_id, "no quotes available");
			return None;
		};

		let report = ProfitReport::from_quote(&best, intent.amount_in, self.gas_price_wei);
		info!(
			venue = %report.venue,
			amount_out = %report.amount_out,
			net_profit = %report.net_profit,
			"selected route"
		);
		Some(report)
	}
}

impl Default for RoutePlanner {
	fn default() -> Self {
		Self::new(Vec::new(), U256::from(DEFAULT_GAS_PRICE_WEI))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{ConnectorError, MockQuoteConnector};
	use alloy::primitives::{Address, Bytes, I256};
	use cipherflow_types::{IntentMetadata, QuoteLeg};

	fn quote(venue: Venue, out: U256, gas: u64) -> QuoteResult {
		QuoteResult {
			leg: QuoteLeg {
				venue,
				chain_id: 84532,
				expected_amount_out: out,
				gas_estimate: U256::from(gas),
				target: Address::ZERO,
				call_data: Bytes::new(),
				bridge_fee: U256::ZERO,
				context: Default::default(),
			},
			quote_timestamp: 1,
			warnings: vec![],
		}
	}

	fn connector(venue: Venue, answer: Option<QuoteResult>) -> Arc<dyn QuoteConnector> {
		let mut connector = MockQuoteConnector::new();
		connector.expect_venue().return_const(venue);
		connector.expect_get_quote().returning(move |_| {
			let answer = answer.clone();
			Box::pin(async move { Ok(answer) })
		});
		Arc::new(connector)
	}

	fn failing(venue: Venue) -> Arc<dyn QuoteConnector> {
		let mut connector = MockQuoteConnector::new();
		connector.expect_venue().return_const(venue);
		connector.expect_get_quote().returning(|_| {
			Box::pin(async move { Err(ConnectorError::Http("timeout".into())) })
		});
		Arc::new(connector)
	}

	fn intent(amount_in: U256) -> SwapIntentDefinition {
		SwapIntentDefinition {
			intent_id: 7,
			commitment_id: None,
			from_token: "WETH".into(),
			to_token: "USDC".into(),
			amount_in,
			min_amount_out: U256::ZERO,
			source_chain_id: 84532,
			destination_chain_id: None,
			metadata: IntentMetadata::default(),
		}
	}

	#[tokio::test]
	async fn test_equal_output_prefers_lower_gas() {
		let amount_in = U256::from(10u64).pow(U256::from(21u64));
		let out = U256::from(102u64) * U256::from(10u64).pow(U256::from(19u64));
		let planner = RoutePlanner::with_gas_price_gwei(
			vec![
				connector(Venue::Uniswap, Some(quote(Venue::Uniswap, out, 150_000))),
				connector(Venue::Curve, Some(quote(Venue::Curve, out, 100_000))),
			],
			25,
		);

		let report = planner.plan_best_route(&intent(amount_in)).await.unwrap();
		assert_eq!(report.venue, Venue::Curve);
		assert_eq!(report.gas_cost, U256::from(100_000u64 * 25_000_000_000u64));
		assert_eq!(
			report.net_profit,
			I256::try_from(out - amount_in - report.gas_cost).unwrap()
		);
	}

	#[tokio::test]
	async fn test_higher_net_wins_and_failures_are_isolated() {
		let amount_in = U256::from(1_000u64);
		let planner = RoutePlanner::new(
			vec![
				failing(Venue::Aerodrome),
				connector(Venue::Uniswap, Some(quote(Venue::Uniswap, U256::from(995u64), 1))),
				connector(Venue::Curve, Some(quote(Venue::Curve, U256::from(1_010u64), 500))),
				connector(Venue::MockBridge, None),
			],
			U256::from(1u64),
		);

		let quotes = planner
			.collect_quotes(&RoutePlanner::quote_request(&intent(amount_in)))
			.await;
		assert_eq!(quotes.len(), 2);
		assert_eq!(quotes[0].leg.venue, Venue::Curve);

		let report = planner.plan_best_route(&intent(amount_in)).await.unwrap();
		assert_eq!(report.venue, Venue::Curve);
		assert_eq!(report.net_profit, I256::try_from(-490i64).unwrap());
	}

	#[tokio::test]
	async fn test_no_quotes_is_none() {
		let planner = RoutePlanner::new(
			vec![failing(Venue::Curve), connector(Venue::Uniswap, None)],
			U256::from(1u64),
		);
		assert!(planner.plan_best_route(&intent(U256::from(5u64))).await.is_none());
		assert!(RoutePlanner::default()
			.plan_best_route(&intent(U256::from(5u64)))
			.await
			.is_none());
	}

	#[test]
	fn test_request_quotes_on_destination_chain() {
		let mut definition = intent(U256::from(5u64));
		definition.destination_chain_id = Some(8453);
		definition.metadata.deadline = Some(1_900_000_000);

		let request = RoutePlanner::quote_request(&definition);
		assert_eq!(request.chain_id, 8453);
		assert_eq!(request.destination_chain_id, Some(8453));
		assert_eq!(request.deadline, Some(1_900_000_000));
	}

	#[test]
	fn test_connector_lookup_by_venue() {
		let planner = RoutePlanner::new(vec![connector(Venue::Curve, None)], U256::from(1u64));
		assert!(planner.connector_for(Venue::Curve).is_some());
		assert!(planner.connector_for(Venue::Uniswap).is_none());
	}
}
