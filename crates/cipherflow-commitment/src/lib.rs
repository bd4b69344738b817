//! Sealed commitments for the solver role.
//!
//! The [`CommitmentBuilder`] plans a route, seals its compact payload with a
//! time-lock bound to the next block and submits the commitment with
//! collateral. The time-lock scheme itself sits behind [`TimelockInterface`].

use alloy::primitives::{Bytes, U256};
use async_trait::async_trait;
use cipherflow_ledger::LedgerError;
use cipherflow_types::{Ciphertext, ConfigSchema};
use thiserror::Error;

pub mod builder;
pub mod scanner;

pub use builder::{CommitOutcome, CommitmentBuilder, CommitmentSettings, SwapOverrides};
pub use scanner::OpenIntentScanner;

pub mod implementations {
	pub mod http;
	pub mod mock;
}

/// Byte ceiling of the time-lock scheme's plaintext.
pub const DEFAULT_PAYLOAD_LIMIT: usize = 256;

/// Tag of the block-height unlock condition.
const BLOCK_CONDITION_TAG: u8 = b'B';

#[derive(Debug, Error)]
pub enum TimelockError {
	#[error("Encryption failed: {0}")]
	Encryption(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

#[derive(Debug, Error)]
pub enum CommitmentError {
	#[error("Payload is {size} bytes, limit is {limit}")]
	PayloadTooLarge { size: usize, limit: usize },
	#[error("Timelock error: {0}")]
	Timelock(#[from] TimelockError),
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Invalid target: {0}")]
	InvalidTarget(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Encrypt-to-future-block primitive.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TimelockInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Seals `plaintext` so the ledger can only open it at `target_block`.
	async fn encrypt(&self, plaintext: &[u8], target_block: u64) -> Result<Ciphertext, TimelockError>;
}

pub type TimelockFactory = fn(&toml::Value) -> Result<Box<dyn TimelockInterface>, TimelockError>;

pub fn get_all_implementations() -> Vec<(&'static str, TimelockFactory)> {
	use implementations::{http, mock};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// Block-height unlock condition: the tag byte followed by the height as a
/// 32-byte big-endian word.
pub fn encode_condition(target_block: u64) -> Bytes {
	let mut encoded = Vec::with_capacity(33);
	encoded.push(BLOCK_CONDITION_TAG);
	encoded.extend_from_slice(&U256::from(target_block).to_be_bytes::<32>());
	Bytes::from(encoded)
}
