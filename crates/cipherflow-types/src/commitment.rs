//! Sealed commitments and the route payload they hide until reveal.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle of a commitment as stored by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitmentState {
	None,
	Committed,
	Revealed,
	Executed,
	Failed,
	Expired,
	Unknown(u8),
}

impl From<u8> for CommitmentState {
	fn from(value: u8) -> Self {
		match value {
			0 => CommitmentState::None,
			1 => CommitmentState::Committed,
			2 => CommitmentState::Revealed,
			3 => CommitmentState::Executed,
			4 => CommitmentState::Failed,
			5 => CommitmentState::Expired,
			other => CommitmentState::Unknown(other),
		}
	}
}

impl From<CommitmentState> for u8 {
	fn from(state: CommitmentState) -> Self {
		match state {
			CommitmentState::None => 0,
			CommitmentState::Committed => 1,
			CommitmentState::Revealed => 2,
			CommitmentState::Executed => 3,
			CommitmentState::Failed => 4,
			CommitmentState::Expired => 5,
			CommitmentState::Unknown(other) => other,
		}
	}
}

/// Point on G2, as the time-lock ciphertext exposes it to the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct G2Point {
	pub x: [U256; 2],
	pub y: [U256; 2],
}

/// Time-lock ciphertext. Opaque to this workspace apart from its shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
	pub u: G2Point,
	pub v: Bytes,
	pub w: Bytes,
}

/// Everything the ledger's `commitToIntent` call needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SealedCommitment {
	pub intent_id: u64,
	pub solver: Address,
	/// keccak256 of the plaintext payload.
	pub payload_hash: B256,
	pub ciphertext: Ciphertext,
	/// Encoded unlock condition (target block).
	pub unlock_condition: Bytes,
	pub target_block: u64,
	pub collateral: U256,
}

/// Commitment record as returned by `getCommitment`.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerCommitment {
	pub commitment_id: u64,
	pub intent_id: u64,
	pub solver: Address,
	pub payload_hash: B256,
	pub collateral: U256,
	pub state: CommitmentState,
	/// Plaintext written by the ledger once the unlock condition is met.
	pub decrypted_payload: Bytes,
}

/// Reveal notification emitted by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealNotice {
	pub commitment_id: u64,
	pub intent_id: u64,
}

/// Outcome written back through `recordExecution`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
	pub commitment_id: u64,
	pub amount_out: U256,
	pub fee_paid: U256,
	pub execution_hash: B256,
	pub success: bool,
}

/// Compact route payload that is time-lock encrypted.
///
/// Keys are single letters to stay under the scheme's byte ceiling. Amounts
/// are decimal strings; `t` is milliseconds since the epoch. Every field
/// defaults so a partially readable reveal still decodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutePayload {
	#[serde(rename = "i")]
	pub intent_id: String,
	#[serde(rename = "s")]
	pub solver: String,
	#[serde(rename = "v")]
	pub venue: String,
	#[serde(rename = "ain")]
	pub amount_in: String,
	#[serde(rename = "min")]
	pub min_amount_out: String,
	#[serde(rename = "aout")]
	pub amount_out: String,
	#[serde(rename = "g")]
	pub gas: String,
	#[serde(rename = "bf")]
	pub bridge_fee: String,
	#[serde(rename = "t")]
	pub timestamp: u64,
}

impl RoutePayload {
	pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
		serde_json::to_vec(self)
	}

	/// Lenient decode: empty or malformed input yields `None`.
	pub fn decode(bytes: &[u8]) -> Option<Self> {
		if bytes.is_empty() {
			return None;
		}
		serde_json::from_slice(bytes).ok()
	}

	pub fn amount_out(&self) -> Option<U256> {
		parse_field(&self.amount_out)
	}

	pub fn gas(&self) -> Option<U256> {
		parse_field(&self.gas)
	}

	pub fn bridge_fee(&self) -> Option<U256> {
		parse_field(&self.bridge_fee)
	}

	pub fn venue(&self) -> Option<&str> {
		if self.venue.is_empty() {
			None
		} else {
			Some(&self.venue)
		}
	}

	pub fn timestamp(&self) -> Option<u64> {
		(self.timestamp > 0).then_some(self.timestamp)
	}
}

fn parse_field(value: &str) -> Option<U256> {
	if value.is_empty() {
		return None;
	}
	U256::from_str(value).ok()
}
