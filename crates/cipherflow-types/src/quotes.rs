//! Quote and route types exchanged between connectors, the planner and the executor.

use crate::intents::IntentMetadata;
use crate::utils::amount;
use alloy::primitives::{Address, Bytes, I256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type ChainId = u64;

/// Base Sepolia, used whenever neither config nor metadata names a chain.
pub const DEFAULT_CHAIN_ID: ChainId = 84532;

/// Gas price assumed when none is configured: 25 gwei.
pub const DEFAULT_GAS_PRICE_WEI: u64 = 25_000_000_000;

/// Liquidity venue a quote is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Venue {
	Aerodrome,
	Uniswap,
	Curve,
	MockBridge,
	Unknown,
}

impl Venue {
	pub fn as_str(&self) -> &'static str {
		match self {
			Venue::Aerodrome => "aerodrome",
			Venue::Uniswap => "uniswap",
			Venue::Curve => "curve",
			Venue::MockBridge => "mock-bridge",
			Venue::Unknown => "unknown",
		}
	}

	pub fn from_name(name: &str) -> Self {
		match name.trim().to_ascii_lowercase().as_str() {
			"aerodrome" => Venue::Aerodrome,
			"uniswap" => Venue::Uniswap,
			"curve" => Venue::Curve,
			"mock-bridge" | "mock_bridge" => Venue::MockBridge,
			_ => Venue::Unknown,
		}
	}
}

impl From<String> for Venue {
	fn from(value: String) -> Self {
		Venue::from_name(&value)
	}
}

impl From<Venue> for String {
	fn from(venue: Venue) -> Self {
		venue.as_str().to_string()
	}
}

impl fmt::Display for Venue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid quote request: {0}")]
pub struct InvalidQuoteRequest(pub String);

/// Swap request handed to every connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
	pub chain_id: ChainId,
	pub from_token: String,
	pub to_token: String,
	#[serde(with = "amount")]
	pub amount_in: U256,
	/// Max slippage in basis points (100 = 1%).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub slippage_bps: Option<u32>,
	/// Unix seconds by which the route must execute.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deadline: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub destination_chain_id: Option<ChainId>,
}

impl QuoteRequest {
	pub fn validate(&self) -> Result<(), InvalidQuoteRequest> {
		if self.chain_id == 0 {
			return Err(InvalidQuoteRequest("chainId must be positive".into()));
		}
		if self.amount_in.is_zero() {
			return Err(InvalidQuoteRequest("amountIn must be positive".into()));
		}
		if let Some(bps) = self.slippage_bps {
			if bps == 0 || bps > 10_000 {
				return Err(InvalidQuoteRequest(format!(
					"slippageBps must be within 1..=10000, got {}",
					bps
				)));
			}
		}
		if self.deadline == Some(0) {
			return Err(InvalidQuoteRequest("deadline must be positive".into()));
		}
		if self.destination_chain_id == Some(0) {
			return Err(InvalidQuoteRequest(
				"destinationChainId must be positive".into(),
			));
		}
		Ok(())
	}
}

/// Execution instructions for one venue.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteLeg {
	pub venue: Venue,
	pub chain_id: ChainId,
	pub expected_amount_out: U256,
	pub gas_estimate: U256,
	/// Router or pool that realises the route; opaque to the core.
	pub target: Address,
	pub call_data: Bytes,
	pub bridge_fee: U256,
	pub context: serde_json::Map<String, serde_json::Value>,
}

/// One venue's answer to a swap request.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteResult {
	pub leg: QuoteLeg,
	/// Milliseconds since the unix epoch.
	pub quote_timestamp: u64,
	pub warnings: Vec<String>,
}

impl QuoteResult {
	/// `expectedAmountOut - bridgeFee - amountIn`, the primary ranking key.
	pub fn net_amount(&self, amount_in: U256) -> I256 {
		net_of(self.leg.expected_amount_out, &[self.leg.bridge_fee, amount_in])
	}
}

/// Picked route and its profitability.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitReport {
	pub venue: Venue,
	pub amount_in: U256,
	pub amount_out: U256,
	/// `gasEstimate * gasPriceWei`.
	pub gas_cost: U256,
	pub bridge_fee: U256,
	/// `amountOut - amountIn - gasCost - bridgeFee`; may be negative.
	pub net_profit: I256,
	pub quote_issued_at: u64,
	pub warnings: Vec<String>,
}

impl ProfitReport {
	pub fn from_quote(quote: &QuoteResult, amount_in: U256, gas_price_wei: U256) -> Self {
		let gas_cost = quote.leg.gas_estimate.saturating_mul(gas_price_wei);
		let net_profit = net_of(
			quote.leg.expected_amount_out,
			&[amount_in, gas_cost, quote.leg.bridge_fee],
		);
		Self {
			venue: quote.leg.venue,
			amount_in,
			amount_out: quote.leg.expected_amount_out,
			gas_cost,
			bridge_fee: quote.leg.bridge_fee,
			net_profit,
			quote_issued_at: quote.quote_timestamp,
			warnings: quote.warnings.clone(),
		}
	}
}

/// Swap as seen by the solver and executor after joining ledger and metadata fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapIntentDefinition {
	pub intent_id: u64,
	pub commitment_id: Option<u64>,
	pub from_token: String,
	pub to_token: String,
	pub amount_in: U256,
	pub min_amount_out: U256,
	pub source_chain_id: ChainId,
	pub destination_chain_id: Option<ChainId>,
	pub metadata: IntentMetadata,
}

impl SwapIntentDefinition {
	/// Chain connectors are asked to quote on: destination if bridging, else source.
	pub fn quote_chain_id(&self) -> ChainId {
		self.destination_chain_id.unwrap_or(self.source_chain_id)
	}
}

/// Converts an amount into signed space, clamping values beyond `I256::MAX`.
pub fn signed(value: U256) -> I256 {
	I256::try_from(value).unwrap_or(I256::MAX)
}

/// `gain` minus every cost, saturating at the `I256` bounds.
pub fn net_of(gain: U256, costs: &[U256]) -> I256 {
	costs
		.iter()
		.fold(signed(gain), |net, cost| net.saturating_sub(signed(*cost)))
}
