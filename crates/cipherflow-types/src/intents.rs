//! Intent types: the normalized off-ledger form and the registered on-ledger form.

use crate::utils::amount;
use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when an intent violates the normalized schema.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntentValidationError {
	#[error("Missing field: {0}")]
	MissingField(&'static str),
	#[error("Invalid amount: {0}")]
	InvalidAmount(String),
	#[error("Unknown source: {0}")]
	UnknownSource(String),
}

/// Origin of a normalized intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentSourceKind {
	#[serde(rename = "manual")]
	Manual,
	#[serde(rename = "cow")]
	Cow,
	#[serde(rename = "oneinch")]
	OneInch,
}

impl IntentSourceKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			IntentSourceKind::Manual => "manual",
			IntentSourceKind::Cow => "cow",
			IntentSourceKind::OneInch => "oneinch",
		}
	}
}

impl fmt::Display for IntentSourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for IntentSourceKind {
	type Err = IntentValidationError;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"manual" => Ok(IntentSourceKind::Manual),
			"cow" => Ok(IntentSourceKind::Cow),
			"oneinch" => Ok(IntentSourceKind::OneInch),
			other => Err(IntentValidationError::UnknownSource(other.to_string())),
		}
	}
}

/// Metadata carried alongside an intent.
///
/// Known keys are typed; everything else is kept in `extra` so re-serializing
/// never drops fields a source attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMetadata {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub valid_to: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub app_data: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub from_token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to_token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source_chain_id: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub destination_chain_id: Option<u64>,
	/// Absolute unix deadline (seconds) forwarded to quote requests.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deadline: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub commit_deadline: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reveal_deadline: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub execution_deadline: Option<u64>,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IntentMetadata {
	/// Fills unset fields from `other`, keeping values already present.
	pub fn merge_missing(&mut self, other: &IntentMetadata) {
		macro_rules! fill {
			($($field:ident),*) => {
				$(if self.$field.is_none() {
					self.$field = other.$field.clone();
				})*
			};
		}
		fill!(
			valid_to,
			app_data,
			from_token,
			to_token,
			source_chain_id,
			destination_chain_id,
			deadline,
			commit_deadline,
			reveal_deadline,
			execution_deadline
		);
		for (key, value) in &other.extra {
			self.extra
				.entry(key.clone())
				.or_insert_with(|| value.clone());
		}
	}
}

/// A candidate trade pulled from an off-ledger source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedIntent {
	pub external_id: String,
	pub trader: String,
	pub from_token: String,
	pub to_token: String,
	#[serde(with = "amount")]
	pub amount_in: U256,
	#[serde(with = "amount")]
	pub min_amount_out: U256,
	pub source: IntentSourceKind,
	#[serde(default)]
	pub metadata: IntentMetadata,
}

impl NormalizedIntent {
	/// Key used by every dedup cache: `source:externalId`.
	pub fn dedup_key(&self) -> String {
		format!("{}:{}", self.source, self.external_id)
	}

	pub fn validate(&self) -> Result<(), IntentValidationError> {
		if self.external_id.trim().is_empty() {
			return Err(IntentValidationError::MissingField("externalId"));
		}
		if self.amount_in.is_zero() {
			return Err(IntentValidationError::InvalidAmount(
				"amountIn must be greater than zero".to_string(),
			));
		}
		Ok(())
	}
}

/// Lifecycle state of an intent as stored by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentState {
	Uninitialized,
	Open,
	Settled,
	Cancelled,
	Expired,
	Unknown(u8),
}

impl From<u8> for IntentState {
	fn from(value: u8) -> Self {
		match value {
			0 => IntentState::Uninitialized,
			1 => IntentState::Open,
			2 => IntentState::Settled,
			3 => IntentState::Cancelled,
			4 => IntentState::Expired,
			other => IntentState::Unknown(other),
		}
	}
}

impl From<IntentState> for u8 {
	fn from(state: IntentState) -> Self {
		match state {
			IntentState::Uninitialized => 0,
			IntentState::Open => 1,
			IntentState::Settled => 2,
			IntentState::Cancelled => 3,
			IntentState::Expired => 4,
			IntentState::Unknown(other) => other,
		}
	}
}

/// The registered, on-ledger form of a trade.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerIntent {
	pub intent_id: u64,
	pub trader: Address,
	pub settlement_asset: Address,
	pub recipient: Address,
	pub amount_in: U256,
	pub min_amount_out: U256,
	pub commit_deadline: u64,
	pub reveal_deadline: u64,
	pub execution_deadline: u64,
	pub extra_data: Bytes,
	pub state: IntentState,
}

impl LedgerIntent {
	/// The ledger returns a zeroed record for ids it never assigned.
	pub fn exists(&self) -> bool {
		!self.trader.is_zero()
	}

	/// Open for commitments at `now` (unix seconds).
	pub fn accepts_commitments_at(&self, now: u64) -> bool {
		self.exists() && self.state == IntentState::Open && self.commit_deadline > now
	}

	/// Decodes `extraData`, degrading to `None` on anything malformed.
	pub fn extra(&self) -> Option<IntentExtraData> {
		IntentExtraData::decode(&self.extra_data)
	}
}

/// Source metadata packed into `LedgerIntent::extra_data` as UTF-8 JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntentExtraData {
	pub external_id: String,
	pub source: String,
	pub trader: String,
	pub metadata: IntentMetadata,
	/// Milliseconds since the unix epoch.
	pub ingested_at: u64,
}

impl IntentExtraData {
	pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
		serde_json::to_vec(self).map(Bytes::from)
	}

	pub fn decode(bytes: &[u8]) -> Option<Self> {
		if bytes.is_empty() {
			return None;
		}
		serde_json::from_slice(bytes).ok()
	}
}

/// Arguments of the ledger's `createIntent` call.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIntentParams {
	pub settlement_asset: Address,
	pub recipient: Address,
	pub amount_in: U256,
	pub min_amount_out: U256,
	pub commit_deadline: u64,
	pub reveal_deadline: u64,
	pub execution_deadline: u64,
	pub extra_data: Bytes,
}

impl CreateIntentParams {
	pub fn deadlines_ordered(&self) -> bool {
		self.commit_deadline < self.reveal_deadline
			&& self.reveal_deadline < self.execution_deadline
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_intent() -> NormalizedIntent {
		NormalizedIntent {
			external_id: "order-1".to_string(),
			trader: "0xtrader".to_string(),
			from_token: "ETH".to_string(),
			to_token: "USDC".to_string(),
			amount_in: U256::from(1_000_000_000_000_000_000u128),
			min_amount_out: U256::from(1_800_000_000u64),
			source: IntentSourceKind::Cow,
			metadata: IntentMetadata::default(),
		}
	}

	#[test]
	fn test_dedup_key_joins_source_and_external_id() {
		assert_eq!(sample_intent().dedup_key(), "cow:order-1");
	}

	#[test]
	fn test_validate_rejects_zero_amount_and_blank_id() {
		let mut intent = sample_intent();
		intent.amount_in = U256::ZERO;
		assert!(matches!(
			intent.validate(),
			Err(IntentValidationError::InvalidAmount(_))
		));

		let mut intent = sample_intent();
		intent.external_id = "  ".to_string();
		assert_eq!(
			intent.validate(),
			Err(IntentValidationError::MissingField("externalId"))
		);
	}

	#[test]
	fn test_metadata_keeps_unknown_keys() {
		let raw = serde_json::json!({
			"validTo": 1700000000u64,
			"appData": "0xabc",
			"referrer": "wallet-x",
			"nested": { "a": 1 }
		});
		let metadata: IntentMetadata = serde_json::from_value(raw.clone()).unwrap();
		assert_eq!(metadata.valid_to, Some(1_700_000_000));
		assert_eq!(metadata.extra.get("referrer").unwrap(), "wallet-x");

		let back = serde_json::to_value(&metadata).unwrap();
		assert_eq!(back, raw);
	}

	#[test]
	fn test_normalized_intent_parses_string_amounts() {
		let raw = serde_json::json!({
			"externalId": "m-1",
			"trader": "0x0000000000000000000000000000000000000001",
			"fromToken": "ETH",
			"toToken": "USDC",
			"amountIn": "5000000000000000000000",
			"minAmountOut": 0,
			"source": "manual"
		});
		let intent: NormalizedIntent = serde_json::from_value(raw).unwrap();
		assert_eq!(
			intent.amount_in,
			U256::from(5_000_000_000_000_000_000_000u128)
		);
		assert_eq!(intent.min_amount_out, U256::ZERO);
		assert_eq!(intent.metadata, IntentMetadata::default());
	}

	#[test]
	fn test_extra_data_decode_is_lenient() {
		assert!(IntentExtraData::decode(b"").is_none());
		assert!(IntentExtraData::decode(b"not json").is_none());

		let decoded = IntentExtraData::decode(br#"{"externalId":"x-9"}"#).unwrap();
		assert_eq!(decoded.external_id, "x-9");
		assert_eq!(decoded.ingested_at, 0);
	}

	#[test]
	fn test_merge_missing_prefers_existing_values() {
		let mut primary = IntentMetadata {
			from_token: Some("0xaaa".to_string()),
			..Default::default()
		};
		let fallback = IntentMetadata {
			from_token: Some("0xbbb".to_string()),
			source_chain_id: Some(8453),
			..Default::default()
		};
		primary.merge_missing(&fallback);
		assert_eq!(primary.from_token.as_deref(), Some("0xaaa"));
		assert_eq!(primary.source_chain_id, Some(8453));
	}

	#[test]
	fn test_intent_state_round_trips_through_u8() {
		assert_eq!(IntentState::from(1u8), IntentState::Open);
		assert_eq!(u8::from(IntentState::Unknown(9)), 9);
	}
}
