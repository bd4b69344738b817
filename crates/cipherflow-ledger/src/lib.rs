//! Client for the ledger of record.
//!
//! The ledger stores intents and commitments and emits reveal notifications.
//! [`LedgerInterface`] is the seam every agent talks through; the `evm`
//! backend speaks to the deployed intent hub over JSON-RPC and the `memory`
//! backend is a deterministic stand-in for tests and local demos.

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use cipherflow_types::{
	ConfigSchema, CreateIntentParams, ExecutionRecord, LedgerCommitment, LedgerIntent, RevealNotice,
	SealedCommitment,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	pub mod memory;
}

#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Transaction failed: {0}")]
	Transaction(String),
	#[error("Decode error: {0}")]
	Decode(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("No signing identity configured")]
	MissingSigner,
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Read, write and watch operations of the ledger of record.
///
/// `next_intent_id` and `next_commitment_id` return the most recently
/// assigned id (ids start at 1, zero means none). Reads of unassigned ids
/// return a zeroed record rather than an error.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait LedgerInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address writes are signed with, if a signing identity is configured.
	fn operator_address(&self) -> Option<Address>;

	async fn block_number(&self) -> Result<u64, LedgerError>;

	/// Escrow that pulls ERC-20 settlement assets on registration.
	async fn settlement_escrow(&self) -> Result<Address, LedgerError>;

	async fn next_intent_id(&self) -> Result<u64, LedgerError>;

	async fn get_intent(&self, intent_id: u64) -> Result<LedgerIntent, LedgerError>;

	async fn next_commitment_id(&self) -> Result<u64, LedgerError>;

	async fn get_commitment(&self, commitment_id: u64) -> Result<LedgerCommitment, LedgerError>;

	/// Registers an intent, attaching `value` wei.
	async fn create_intent(
		&self,
		params: &CreateIntentParams,
		value: U256,
	) -> Result<TxHash, LedgerError>;

	async fn allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, LedgerError>;

	async fn approve(
		&self,
		token: Address,
		spender: Address,
		amount: U256,
	) -> Result<TxHash, LedgerError>;

	/// Submits a sealed commitment with its collateral in one transaction.
	async fn commit_to_intent(
		&self,
		commitment: &SealedCommitment,
		callback_gas_limit: u32,
	) -> Result<TxHash, LedgerError>;

	async fn record_execution(&self, record: &ExecutionRecord) -> Result<TxHash, LedgerError>;

	/// Streams reveal notifications into `sender` until [`stop_watching`]
	/// is called.
	///
	/// [`stop_watching`]: LedgerInterface::stop_watching
	async fn watch_reveals(
		&self,
		sender: mpsc::UnboundedSender<RevealNotice>,
	) -> Result<(), LedgerError>;

	async fn stop_watching(&self) -> Result<(), LedgerError>;
}

pub type LedgerFactory = fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError>;

pub fn get_all_implementations() -> Vec<(&'static str, LedgerFactory)> {
	use implementations::{evm::alloy, memory};

	vec![
		(alloy::Registry::NAME, alloy::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Shared handle on the configured ledger backend.
///
/// Besides passing calls through, it implements the bounded backward scans
/// used by the publisher, the solver and the reveal sweep.
pub struct LedgerService {
	backend: Box<dyn LedgerInterface>,
}

impl LedgerService {
	pub fn new(backend: Box<dyn LedgerInterface>) -> Self {
		Self { backend }
	}

	pub fn backend(&self) -> &dyn LedgerInterface {
		self.backend.as_ref()
	}

	pub fn operator_address(&self) -> Option<Address> {
		self.backend.operator_address()
	}

	pub fn has_signer(&self) -> bool {
		self.backend.operator_address().is_some()
	}

	pub async fn block_number(&self) -> Result<u64, LedgerError> {
		self.backend.block_number().await
	}

	pub async fn settlement_escrow(&self) -> Result<Address, LedgerError> {
		self.backend.settlement_escrow().await
	}

	pub async fn get_intent(&self, intent_id: u64) -> Result<LedgerIntent, LedgerError> {
		self.backend.get_intent(intent_id).await
	}

	pub async fn get_commitment(&self, commitment_id: u64) -> Result<LedgerCommitment, LedgerError> {
		self.backend.get_commitment(commitment_id).await
	}

	pub async fn create_intent(
		&self,
		params: &CreateIntentParams,
		value: U256,
	) -> Result<TxHash, LedgerError> {
		self.backend.create_intent(params, value).await
	}

	pub async fn allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, LedgerError> {
		self.backend.allowance(token, owner, spender).await
	}

	pub async fn approve(
		&self,
		token: Address,
		spender: Address,
		amount: U256,
	) -> Result<TxHash, LedgerError> {
		self.backend.approve(token, spender, amount).await
	}

	pub async fn commit_to_intent(
		&self,
		commitment: &SealedCommitment,
		callback_gas_limit: u32,
	) -> Result<TxHash, LedgerError> {
		self.backend
			.commit_to_intent(commitment, callback_gas_limit)
			.await
	}

	pub async fn record_execution(&self, record: &ExecutionRecord) -> Result<TxHash, LedgerError> {
		self.backend.record_execution(record).await
	}

	pub async fn watch_reveals(
		&self,
		sender: mpsc::UnboundedSender<RevealNotice>,
	) -> Result<(), LedgerError> {
		self.backend.watch_reveals(sender).await
	}

	pub async fn stop_watching(&self) -> Result<(), LedgerError> {
		self.backend.stop_watching().await
	}

	/// Looks for an intent whose `extraData` carries `external_id` among the
	/// `scan_limit` most recent intents. Older registrations are not seen.
	pub async fn find_registered_external_id(
		&self,
		external_id: &str,
		scan_limit: u64,
	) -> Result<Option<u64>, LedgerError> {
		let latest = self.backend.next_intent_id().await?;

		for intent_id in (1..=latest).rev().take(scan_limit as usize) {
			let intent = self.backend.get_intent(intent_id).await?;
			if intent
				.extra()
				.is_some_and(|extra| extra.external_id == external_id)
			{
				debug!(intent_id, external_id, "external id already registered");
				return Ok(Some(intent_id));
			}
		}

		Ok(None)
	}

	/// Most recent intent, among the last `max_scan`, that still accepts
	/// commitments at `now`.
	pub async fn find_open_intent(
		&self,
		max_scan: u64,
		now: u64,
	) -> Result<Option<LedgerIntent>, LedgerError> {
		let latest = self.backend.next_intent_id().await?;

		for intent_id in (1..=latest).rev().take(max_scan as usize) {
			let intent = self.backend.get_intent(intent_id).await?;
			if intent.accepts_commitments_at(now) {
				return Ok(Some(intent));
			}
		}

		Ok(None)
	}

	/// Every intent among the last `max_scan` that accepts commitments at
	/// `now`, newest first.
	pub async fn open_intents(
		&self,
		max_scan: u64,
		now: u64,
	) -> Result<Vec<LedgerIntent>, LedgerError> {
		let latest = self.backend.next_intent_id().await?;
		let mut open = Vec::new();

		for intent_id in (1..=latest).rev().take(max_scan as usize) {
			let intent = self.backend.get_intent(intent_id).await?;
			if intent.accepts_commitments_at(now) {
				open.push(intent);
			}
		}

		Ok(open)
	}

	/// Commitments in the `Revealed` state among the last `max_scan`,
	/// newest first, at most `limit` of them. A commitment that cannot be
	/// read is logged and skipped.
	pub async fn collect_revealed_commitments(
		&self,
		max_scan: u64,
		limit: usize,
	) -> Result<Vec<RevealNotice>, LedgerError> {
		let latest = self.backend.next_commitment_id().await?;
		let mut revealed = Vec::new();

		for commitment_id in (1..=latest).rev().take(max_scan as usize) {
			if revealed.len() >= limit {
				break;
			}
			let record = match self.backend.get_commitment(commitment_id).await {
				Ok(record) => record,
				Err(e) => {
					warn!(commitment_id, error = %e, "skipping unreadable commitment");
					continue;
				}
			};
			if record.state == cipherflow_types::CommitmentState::Revealed {
				revealed.push(RevealNotice {
					commitment_id,
					intent_id: record.intent_id,
				});
			}
		}

		Ok(revealed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{Bytes, B256};
	use cipherflow_types::{CommitmentState, IntentExtraData, IntentState};
	use mockall::predicate::eq;

	fn intent(intent_id: u64, external_id: &str, state: IntentState, commit_deadline: u64) -> LedgerIntent {
		let extra = IntentExtraData {
			external_id: external_id.to_string(),
			source: "cow".into(),
			..Default::default()
		};
		LedgerIntent {
			intent_id,
			trader: Address::repeat_byte(0x11),
			settlement_asset: Address::ZERO,
			recipient: Address::repeat_byte(0x11),
			amount_in: U256::from(1u64),
			min_amount_out: U256::ZERO,
			commit_deadline,
			reveal_deadline: commit_deadline + 60,
			execution_deadline: commit_deadline + 120,
			extra_data: extra.encode().unwrap(),
			state,
		}
	}

	fn commitment(commitment_id: u64, intent_id: u64, state: CommitmentState) -> LedgerCommitment {
		LedgerCommitment {
			commitment_id,
			intent_id,
			solver: Address::repeat_byte(0x22),
			payload_hash: B256::ZERO,
			collateral: U256::from(1u64),
			state,
			decrypted_payload: Bytes::new(),
		}
	}

	#[tokio::test]
	async fn test_external_id_scan_is_bounded() {
		let mut backend = MockLedgerInterface::new();
		backend
			.expect_next_intent_id()
			.returning(|| Box::pin(async move { Ok(100) }));
		backend.expect_get_intent().times(3).returning(|id| {
			let record = if id == 97 {
				intent(id, "order-7", IntentState::Open, 10)
			} else {
				intent(id, "other", IntentState::Open, 10)
			};
			Box::pin(async move { Ok(record) })
		});

		let service = LedgerService::new(Box::new(backend));
		assert_eq!(
			service
				.find_registered_external_id("order-7", 3)
				.await
				.unwrap(),
			None
		);
	}

	#[tokio::test]
	async fn test_external_id_found_within_window() {
		let mut backend = MockLedgerInterface::new();
		backend
			.expect_next_intent_id()
			.returning(|| Box::pin(async move { Ok(2) }));
		backend
			.expect_get_intent()
			.with(eq(2))
			.returning(|id| Box::pin(async move { Ok(intent(id, "order-7", IntentState::Open, 10)) }));

		let service = LedgerService::new(Box::new(backend));
		assert_eq!(
			service
				.find_registered_external_id("order-7", 50)
				.await
				.unwrap(),
			Some(2)
		);
	}

	#[tokio::test]
	async fn test_open_intent_scan_skips_closed_and_missing() {
		let mut backend = MockLedgerInterface::new();
		backend
			.expect_next_intent_id()
			.returning(|| Box::pin(async move { Ok(4) }));
		backend.expect_get_intent().returning(|id| {
			let record = match id {
				4 => LedgerIntent {
					trader: Address::ZERO,
					..intent(id, "a", IntentState::Open, 2_000)
				},
				3 => intent(id, "b", IntentState::Settled, 2_000),
				2 => intent(id, "c", IntentState::Open, 500),
				_ => intent(id, "d", IntentState::Open, 2_000),
			};
			Box::pin(async move { Ok(record) })
		});

		let service = LedgerService::new(Box::new(backend));
		let found = service.find_open_intent(25, 1_000).await.unwrap();
		assert_eq!(found.map(|i| i.intent_id), Some(1));

		let open = service.open_intents(25, 1_000).await.unwrap();
		assert_eq!(open.iter().map(|i| i.intent_id).collect::<Vec<_>>(), vec![1]);
		let recent = service.open_intents(2, 1_000).await.unwrap();
		assert!(recent.is_empty());
	}

	#[tokio::test]
	async fn test_collect_revealed_respects_limit() {
		let mut backend = MockLedgerInterface::new();
		backend
			.expect_next_commitment_id()
			.returning(|| Box::pin(async move { Ok(5) }));
		backend.expect_get_commitment().returning(|id| {
			let state = if id % 2 == 1 {
				CommitmentState::Revealed
			} else {
				CommitmentState::Executed
			};
			Box::pin(async move { Ok(commitment(id, id * 10, state)) })
		});

		let service = LedgerService::new(Box::new(backend));
		let revealed = service.collect_revealed_commitments(25, 2).await.unwrap();
		assert_eq!(
			revealed,
			vec![
				RevealNotice {
					commitment_id: 5,
					intent_id: 50
				},
				RevealNotice {
					commitment_id: 3,
					intent_id: 30
				},
			]
		);
	}

	#[tokio::test]
	async fn test_collect_revealed_skips_unreadable_commitment() {
		let mut backend = MockLedgerInterface::new();
		backend
			.expect_next_commitment_id()
			.returning(|| Box::pin(async move { Ok(2) }));
		backend
			.expect_get_commitment()
			.with(eq(2))
			.returning(|_| Box::pin(async move { Err(LedgerError::Network("boom".into())) }));
		backend
			.expect_get_commitment()
			.with(eq(1))
			.returning(|id| Box::pin(async move { Ok(commitment(id, 7, CommitmentState::Revealed)) }));

		let service = LedgerService::new(Box::new(backend));
		let revealed = service.collect_revealed_commitments(25, 20).await.unwrap();
		assert_eq!(
			revealed,
			vec![RevealNotice {
				commitment_id: 1,
				intent_id: 7
			}]
		);
	}

	#[tokio::test]
	async fn test_empty_ledger_yields_nothing() {
		let mut backend = MockLedgerInterface::new();
		backend
			.expect_next_commitment_id()
			.returning(|| Box::pin(async move { Ok(0) }));
		backend.expect_get_commitment().never();

		let service = LedgerService::new(Box::new(backend));
		assert!(service
			.collect_revealed_commitments(25, 20)
			.await
			.unwrap()
			.is_empty());
	}
}
