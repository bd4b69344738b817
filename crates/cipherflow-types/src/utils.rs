//! Small helpers shared across crates.

use alloy::primitives::{Address, U256};
use std::str::FromStr;

/// Current unix time in seconds.
pub fn current_timestamp() -> u64 {
	chrono::Utc::now().timestamp().max(0) as u64
}

/// Current unix time in milliseconds.
pub fn current_timestamp_millis() -> u64 {
	chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Shortens a hash or identifier for log output.
pub fn truncate_id(id: &str) -> String {
	if id.chars().count() <= 12 {
		return id.to_string();
	}
	let head: String = id.chars().take(10).collect();
	format!("{}..", head)
}

/// Parses a hex address, returning `None` for anything that is not one.
pub fn parse_address(value: &str) -> Option<Address> {
	let trimmed = value.trim();
	if !trimmed.starts_with("0x") || trimmed.len() != 42 {
		return None;
	}
	Address::from_str(trimmed).ok()
}

/// Parses a non-negative base-unit amount from a decimal (or 0x-prefixed hex) string.
pub fn parse_amount(value: &str) -> Result<U256, String> {
	let trimmed = value.trim();
	if trimmed.is_empty() {
		return Err("amount is empty".to_string());
	}
	if trimmed.starts_with('-') {
		return Err(format!("amount must be non-negative, got {}", trimmed));
	}
	U256::from_str(trimmed).map_err(|e| format!("invalid amount '{}': {}", trimmed, e))
}

/// Serde adapter that writes amounts as decimal strings and reads strings or integers.
pub mod amount {
	use super::parse_amount;
	use alloy::primitives::U256;
	use serde::{de, Deserialize, Deserializer, Serializer};

	#[derive(Deserialize)]
	#[serde(untagged)]
	enum RawAmount {
		Text(String),
		Integer(u64),
		Float(f64),
	}

	pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&value.to_string())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
		match RawAmount::deserialize(deserializer)? {
			RawAmount::Text(text) => parse_amount(&text).map_err(de::Error::custom),
			RawAmount::Integer(value) => Ok(U256::from(value)),
			RawAmount::Float(value) if value >= 0.0 && value.is_finite() => {
				Ok(U256::from(value.trunc() as u128))
			}
			RawAmount::Float(value) => Err(de::Error::custom(format!(
				"amount must be a non-negative number, got {}",
				value
			))),
		}
	}
}
