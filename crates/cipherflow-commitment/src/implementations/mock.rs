//! Pass-through time-lock for local runs and tests.
//!
//! The "ciphertext" carries the plaintext in `v` and a keccak of plaintext
//! and target block in `w`. Nothing is hidden.

use crate::{TimelockError, TimelockInterface};
use alloy::primitives::{keccak256, Bytes};
use async_trait::async_trait;
use cipherflow_types::{Ciphertext, ConfigSchema, Schema, ValidationError};
use tracing::warn;

pub struct PlaintextTimelock;

#[async_trait]
impl TimelockInterface for PlaintextTimelock {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(PlaintextTimelockSchema)
	}

	async fn encrypt(&self, plaintext: &[u8], target_block: u64) -> Result<Ciphertext, TimelockError> {
		let mut tagged = plaintext.to_vec();
		tagged.extend_from_slice(&target_block.to_be_bytes());
		Ok(Ciphertext {
			u: Default::default(),
			v: Bytes::copy_from_slice(plaintext),
			w: Bytes::from(keccak256(&tagged).to_vec()),
		})
	}
}

pub struct PlaintextTimelockSchema;

impl ConfigSchema for PlaintextTimelockSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_timelock(config: &toml::Value) -> Result<Box<dyn TimelockInterface>, TimelockError> {
	PlaintextTimelockSchema
		.validate(config)
		.map_err(|e| TimelockError::Configuration(e.to_string()))?;
	warn!("mock timelock configured, commitments are not sealed");
	Ok(Box::new(PlaintextTimelock))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "mock";

	pub fn factory() -> crate::TimelockFactory {
		create_timelock
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_ciphertext_binds_target_block() {
		let early = PlaintextTimelock.encrypt(b"route", 10).await.unwrap();
		let late = PlaintextTimelock.encrypt(b"route", 11).await.unwrap();
		assert_eq!(early.v.as_ref(), b"route");
		assert_ne!(early.w, late.w);
	}
}
