//! In-process ledger with the intent hub's validation rules.
//!
//! It has no time-lock oracle; [`InMemoryLedger::reveal`] plays that role and
//! notifies every active watcher.

use crate::{LedgerError, LedgerInterface};
use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use cipherflow_types::{
	current_timestamp, CommitmentState, ConfigSchema, CreateIntentParams, ExecutionRecord, Field,
	FieldType, IntentState, LedgerCommitment, LedgerIntent, RevealNotice, Schema, SealedCommitment,
	ValidationError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Default)]
struct State {
	block_number: u64,
	tx_count: u64,
	intents: Vec<LedgerIntent>,
	commitments: Vec<LedgerCommitment>,
	allowances: HashMap<(Address, Address, Address), U256>,
	executions: Vec<ExecutionRecord>,
	watchers: Vec<mpsc::UnboundedSender<RevealNotice>>,
	failing_writes: usize,
}

impl State {
	/// Mines a block for a successful write and returns its hash.
	fn mine(&mut self) -> TxHash {
		self.tx_count += 1;
		self.block_number += 1;
		keccak256(self.tx_count.to_be_bytes())
	}

	fn take_injected_failure(&mut self) -> Result<(), LedgerError> {
		if self.failing_writes > 0 {
			self.failing_writes -= 1;
			return Err(LedgerError::Transaction("injected failure".to_string()));
		}
		Ok(())
	}
}

#[derive(Clone)]
pub struct InMemoryLedger {
	operator: Option<Address>,
	escrow: Address,
	state: Arc<Mutex<State>>,
}

impl InMemoryLedger {
	pub fn new(operator: Option<Address>, escrow: Address) -> Self {
		Self {
			operator,
			escrow,
			state: Arc::new(Mutex::new(State {
				block_number: 1,
				..Default::default()
			})),
		}
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn signer(&self) -> Result<Address, LedgerError> {
		self.operator.ok_or(LedgerError::MissingSigner)
	}

	/// Stores an intent as if another party registered it.
	pub fn insert_intent(&self, mut intent: LedgerIntent) -> u64 {
		let mut state = self.lock();
		let intent_id = state.intents.len() as u64 + 1;
		intent.intent_id = intent_id;
		state.intents.push(intent);
		state.mine();
		intent_id
	}

	/// Marks a commitment revealed with `payload` as its plaintext.
	pub fn reveal(&self, commitment_id: u64, payload: Bytes) -> Result<RevealNotice, LedgerError> {
		let mut state = self.lock();
		let index = commitment_index(&state, commitment_id)?;
		let record = &mut state.commitments[index];
		if record.state != CommitmentState::Committed {
			return Err(LedgerError::Transaction(format!(
				"commitment {} is {:?}",
				commitment_id, record.state
			)));
		}
		record.state = CommitmentState::Revealed;
		record.decrypted_payload = payload;
		let notice = RevealNotice {
			commitment_id,
			intent_id: record.intent_id,
		};

		state.watchers.retain(|w| w.send(notice).is_ok());
		Ok(notice)
	}

	/// Makes the next `count` writes revert.
	pub fn fail_next_writes(&self, count: usize) {
		self.lock().failing_writes = count;
	}

	pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
		self.lock().allowances.insert((token, owner, spender), amount);
	}

	pub fn intents(&self) -> Vec<LedgerIntent> {
		self.lock().intents.clone()
	}

	pub fn commitments(&self) -> Vec<LedgerCommitment> {
		self.lock().commitments.clone()
	}

	pub fn executions(&self) -> Vec<ExecutionRecord> {
		self.lock().executions.clone()
	}

	pub fn watcher_count(&self) -> usize {
		self.lock().watchers.len()
	}
}

fn commitment_index(state: &State, commitment_id: u64) -> Result<usize, LedgerError> {
	let index = (commitment_id as usize).wrapping_sub(1);
	if index < state.commitments.len() {
		Ok(index)
	} else {
		Err(LedgerError::NotFound(format!("commitment {}", commitment_id)))
	}
}

fn zeroed_intent(intent_id: u64) -> LedgerIntent {
	LedgerIntent {
		intent_id,
		trader: Address::ZERO,
		settlement_asset: Address::ZERO,
		recipient: Address::ZERO,
		amount_in: U256::ZERO,
		min_amount_out: U256::ZERO,
		commit_deadline: 0,
		reveal_deadline: 0,
		execution_deadline: 0,
		extra_data: Bytes::new(),
		state: IntentState::Uninitialized,
	}
}

#[async_trait]
impl LedgerInterface for InMemoryLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(InMemoryLedgerSchema)
	}

	fn operator_address(&self) -> Option<Address> {
		self.operator
	}

	async fn block_number(&self) -> Result<u64, LedgerError> {
		Ok(self.lock().block_number)
	}

	async fn settlement_escrow(&self) -> Result<Address, LedgerError> {
		Ok(self.escrow)
	}

	async fn next_intent_id(&self) -> Result<u64, LedgerError> {
		Ok(self.lock().intents.len() as u64)
	}

	async fn get_intent(&self, intent_id: u64) -> Result<LedgerIntent, LedgerError> {
		let state = self.lock();
		Ok(intent_id
			.checked_sub(1)
			.and_then(|index| state.intents.get(index as usize))
			.cloned()
			.unwrap_or_else(|| zeroed_intent(intent_id)))
	}

	async fn next_commitment_id(&self) -> Result<u64, LedgerError> {
		Ok(self.lock().commitments.len() as u64)
	}

	async fn get_commitment(&self, commitment_id: u64) -> Result<LedgerCommitment, LedgerError> {
		let state = self.lock();
		Ok(commitment_index(&state, commitment_id)
			.map(|index| state.commitments[index].clone())
			.unwrap_or(LedgerCommitment {
				commitment_id,
				intent_id: 0,
				solver: Address::ZERO,
				payload_hash: Default::default(),
				collateral: U256::ZERO,
				state: CommitmentState::None,
				decrypted_payload: Bytes::new(),
			}))
	}

	async fn create_intent(
		&self,
		params: &CreateIntentParams,
		value: U256,
	) -> Result<TxHash, LedgerError> {
		let trader = self.signer()?;
		let mut state = self.lock();
		state.take_injected_failure()?;

		if !params.deadlines_ordered() {
			return Err(LedgerError::Transaction("deadlines out of order".to_string()));
		}
		if params.amount_in.is_zero() {
			return Err(LedgerError::Transaction("zero amount".to_string()));
		}
		if params.settlement_asset.is_zero() {
			if value != params.amount_in {
				return Err(LedgerError::Transaction("value mismatch".to_string()));
			}
		} else {
			let allowance = state
				.allowances
				.get(&(params.settlement_asset, trader, self.escrow))
				.copied()
				.unwrap_or_default();
			if allowance < params.amount_in {
				return Err(LedgerError::Transaction("insufficient allowance".to_string()));
			}
		}

		let intent_id = state.intents.len() as u64 + 1;
		state.intents.push(LedgerIntent {
			intent_id,
			trader,
			settlement_asset: params.settlement_asset,
			recipient: params.recipient,
			amount_in: params.amount_in,
			min_amount_out: params.min_amount_out,
			commit_deadline: params.commit_deadline,
			reveal_deadline: params.reveal_deadline,
			execution_deadline: params.execution_deadline,
			extra_data: params.extra_data.clone(),
			state: IntentState::Open,
		});
		Ok(state.mine())
	}

	async fn allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, LedgerError> {
		Ok(self
			.lock()
			.allowances
			.get(&(token, owner, spender))
			.copied()
			.unwrap_or_default())
	}

	async fn approve(
		&self,
		token: Address,
		spender: Address,
		amount: U256,
	) -> Result<TxHash, LedgerError> {
		let owner = self.signer()?;
		let mut state = self.lock();
		state.take_injected_failure()?;
		state.allowances.insert((token, owner, spender), amount);
		Ok(state.mine())
	}

	async fn commit_to_intent(
		&self,
		commitment: &SealedCommitment,
		_callback_gas_limit: u32,
	) -> Result<TxHash, LedgerError> {
		let solver = self.signer()?;
		let mut state = self.lock();
		state.take_injected_failure()?;

		let open = commitment
			.intent_id
			.checked_sub(1)
			.and_then(|index| state.intents.get(index as usize))
			.is_some_and(|intent| intent.accepts_commitments_at(current_timestamp()));
		if !open {
			return Err(LedgerError::Transaction(format!(
				"intent {} not accepting commitments",
				commitment.intent_id
			)));
		}
		if commitment.collateral.is_zero() {
			return Err(LedgerError::Transaction("collateral required".to_string()));
		}

		let commitment_id = state.commitments.len() as u64 + 1;
		state.commitments.push(LedgerCommitment {
			commitment_id,
			intent_id: commitment.intent_id,
			solver,
			payload_hash: commitment.payload_hash,
			collateral: commitment.collateral,
			state: CommitmentState::Committed,
			decrypted_payload: Bytes::new(),
		});
		Ok(state.mine())
	}

	async fn record_execution(&self, record: &ExecutionRecord) -> Result<TxHash, LedgerError> {
		self.signer()?;
		let mut state = self.lock();
		state.take_injected_failure()?;

		let index = commitment_index(&state, record.commitment_id)?;
		let commitment = &mut state.commitments[index];
		if commitment.state != CommitmentState::Revealed {
			return Err(LedgerError::Transaction(format!(
				"commitment {} is {:?}",
				record.commitment_id, commitment.state
			)));
		}
		commitment.state = if record.success {
			CommitmentState::Executed
		} else {
			CommitmentState::Failed
		};
		state.executions.push(record.clone());
		Ok(state.mine())
	}

	async fn watch_reveals(
		&self,
		sender: mpsc::UnboundedSender<RevealNotice>,
	) -> Result<(), LedgerError> {
		self.lock().watchers.push(sender);
		Ok(())
	}

	async fn stop_watching(&self) -> Result<(), LedgerError> {
		self.lock().watchers.clear();
		Ok(())
	}
}

pub struct InMemoryLedgerSchema;

impl ConfigSchema for InMemoryLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("operator_address", FieldType::Address),
				Field::new("settlement_escrow", FieldType::Address),
			],
		)
		.validate(config)
	}
}

/// Builds an [`InMemoryLedger`].
///
/// - `operator_address` (optional): signing identity; omit for read-only
/// - `settlement_escrow` (optional, default zero address)
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	InMemoryLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(e.to_string()))?;

	let address = |key: &str| {
		config
			.get(key)
			.and_then(|v| v.as_str())
			.and_then(cipherflow_types::parse_address)
	};

	Ok(Box::new(InMemoryLedger::new(
		address("operator_address"),
		address("settlement_escrow").unwrap_or(Address::ZERO),
	)))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "memory";

	pub fn factory() -> crate::LedgerFactory {
		create_ledger
	}
}
