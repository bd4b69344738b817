//! Intent hub client over JSON-RPC using alloy.
//!
//! Reads go through a plain HTTP provider. Writes need a signing identity
//! (`private_key`); without one every write fails with
//! [`LedgerError::MissingSigner`]. Reveal events are discovered by polling
//! `eth_getLogs` on a fixed interval.

use crate::{LedgerError, LedgerInterface};
use alloy::{
	network::EthereumWallet,
	primitives::{Address, TxHash, U256},
	providers::{DynProvider, Provider, ProviderBuilder},
	rpc::types::{Filter, TransactionReceipt},
	signers::local::PrivateKeySigner,
	sol,
	sol_types::SolEvent,
};
use async_trait::async_trait;
use cipherflow_types::{
	truncate_id, CommitmentState, ConfigSchema, CreateIntentParams, ExecutionRecord, Field,
	FieldType, IntentState, LedgerCommitment, LedgerIntent, RevealNotice, Schema,
	SealedCommitment, ValidationError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

sol! {
	#[sol(rpc)]
	interface IIntentHub {
		struct Intent {
			address trader;
			address settlementAsset;
			address recipient;
			uint256 amountIn;
			uint256 minAmountOut;
			uint64 commitDeadline;
			uint64 revealDeadline;
			uint64 executionDeadline;
			uint8 state;
			bytes extraData;
		}

		struct CreateIntentParams {
			address settlementAsset;
			address recipient;
			uint256 amountIn;
			uint256 minAmountOut;
			uint64 commitDeadline;
			uint64 revealDeadline;
			uint64 executionDeadline;
			bytes extraData;
		}

		struct G2Point {
			uint256[2] x;
			uint256[2] y;
		}

		struct Ciphertext {
			G2Point u;
			bytes v;
			bytes w;
		}

		struct Reveal {
			bytes decryptedPayload;
			uint64 revealedAt;
		}

		struct Commitment {
			uint256 intentId;
			address solver;
			bytes32 payloadHash;
			uint256 collateral;
			uint8 state;
			Reveal reveal;
		}

		event CommitmentRevealed(uint256 indexed commitmentId, uint256 indexed intentId);

		function SETTLEMENT_ESCROW() external view returns (address);
		function nextIntentId() external view returns (uint256);
		function nextCommitmentId() external view returns (uint256);
		function getIntent(uint256 intentId) external view returns (Intent memory);
		function getCommitment(uint256 commitmentId) external view returns (Commitment memory);
		function createIntent(CreateIntentParams calldata params) external payable returns (uint256);
		function commitToIntent(
			uint256 intentId,
			bytes32 payloadHash,
			Ciphertext calldata ciphertext,
			bytes calldata condition,
			uint32 callbackGasLimit,
			uint256 collateral
		) external payable returns (uint256);
		function recordExecution(
			uint256 commitmentId,
			uint256 amountOut,
			uint256 feePaid,
			bytes32 executionHash,
			bool success
		) external;
	}

	#[sol(rpc)]
	interface IERC20 {
		function allowance(address owner, address spender) external view returns (uint256);
		function approve(address spender, uint256 amount) external returns (bool);
	}
}

type HubInstance = IIntentHub::IIntentHubInstance<DynProvider>;

pub struct AlloyLedger {
	provider: DynProvider,
	hub: HubInstance,
	hub_address: Address,
	operator: Option<Address>,
	polling_interval: Duration,
	is_monitoring: Arc<AtomicBool>,
	stop_signal: Arc<Mutex<Option<mpsc::Sender<()>>>>,
}

impl AlloyLedger {
	pub fn new(
		rpc_url: &str,
		hub_address: Address,
		signer: Option<PrivateKeySigner>,
		polling_interval: Duration,
	) -> Result<Self, LedgerError> {
		let url = rpc_url
			.parse()
			.map_err(|e| LedgerError::Configuration(format!("Invalid RPC URL: {}", e)))?;

		let operator = signer.as_ref().map(|s| s.address());
		let provider = match signer {
			Some(signer) => ProviderBuilder::new()
				.wallet(EthereumWallet::from(signer))
				.connect_http(url)
				.erased(),
			None => ProviderBuilder::new().connect_http(url).erased(),
		};

		Ok(Self {
			hub: IIntentHub::new(hub_address, provider.clone()),
			provider,
			hub_address,
			operator,
			polling_interval,
			is_monitoring: Arc::new(AtomicBool::new(false)),
			stop_signal: Arc::new(Mutex::new(None)),
		})
	}

	fn require_signer(&self) -> Result<(), LedgerError> {
		self.operator.map(|_| ()).ok_or(LedgerError::MissingSigner)
	}

	async fn monitoring_loop(
		provider: DynProvider,
		hub_address: Address,
		mut last_block: u64,
		polling_interval: Duration,
		sender: mpsc::UnboundedSender<RevealNotice>,
		mut stop_rx: mpsc::Receiver<()>,
	) {
		let mut interval = tokio::time::interval(polling_interval);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					let current_block = match provider.get_block_number().await {
						Ok(block) => block,
						Err(e) => {
							tracing::error!("Failed to get block number: {}", e);
							continue;
						}
					};

					if current_block <= last_block {
						continue;
					}

					let filter = Filter::new()
						.address(hub_address)
						.event_signature(IIntentHub::CommitmentRevealed::SIGNATURE_HASH)
						.from_block(last_block + 1)
						.to_block(current_block);

					let logs = match provider.get_logs(&filter).await {
						Ok(logs) => logs,
						Err(e) => {
							tracing::warn!(from = last_block + 1, to = current_block, "Failed to fetch reveal logs: {}", e);
							continue;
						}
					};

					for log in logs {
						match log.log_decode::<IIntentHub::CommitmentRevealed>() {
							Ok(decoded) => {
								let event = decoded.inner.data;
								let notice = RevealNotice {
									commitment_id: event.commitmentId.saturating_to(),
									intent_id: event.intentId.saturating_to(),
								};
								if sender.send(notice).is_err() {
									return;
								}
							}
							Err(e) => tracing::warn!("Failed to decode reveal log: {}", e),
						}
					}

					last_block = current_block;
				}
				_ = stop_rx.recv() => {
					break;
				}
			}
		}
	}
}

fn network<E: std::fmt::Display>(e: E) -> LedgerError {
	LedgerError::Network(e.to_string())
}

fn settled(receipt: TransactionReceipt) -> Result<TxHash, LedgerError> {
	let tx_hash = receipt.transaction_hash;
	if !receipt.status() {
		return Err(LedgerError::Transaction(format!(
			"transaction {} reverted",
			tx_hash
		)));
	}
	tracing::info!(tx_hash = %truncate_id(&tx_hash.to_string()), "Transaction confirmed");
	Ok(tx_hash)
}

pub struct AlloyLedgerSchema;

impl ConfigSchema for AlloyLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::Url),
				Field::new("intent_hub_address", FieldType::Address),
			],
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap_or_default();
					let key_without_prefix = key.strip_prefix("0x").unwrap_or(key);

					if key_without_prefix.len() != 64 {
						return Err("Private key must be 64 hex characters (32 bytes)".to_string());
					}

					if hex::decode(key_without_prefix).is_err() {
						return Err("Private key must be valid hexadecimal".to_string());
					}

					Ok(())
				}),
				Field::new(
					"polling_interval_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl LedgerInterface for AlloyLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyLedgerSchema)
	}

	fn operator_address(&self) -> Option<Address> {
		self.operator
	}

	async fn block_number(&self) -> Result<u64, LedgerError> {
		self.provider.get_block_number().await.map_err(network)
	}

	async fn settlement_escrow(&self) -> Result<Address, LedgerError> {
		self.hub.SETTLEMENT_ESCROW().call().await.map_err(network)
	}

	async fn next_intent_id(&self) -> Result<u64, LedgerError> {
		let id = self.hub.nextIntentId().call().await.map_err(network)?;
		Ok(id.saturating_to())
	}

	async fn get_intent(&self, intent_id: u64) -> Result<LedgerIntent, LedgerError> {
		let record = self
			.hub
			.getIntent(U256::from(intent_id))
			.call()
			.await
			.map_err(network)?;

		Ok(LedgerIntent {
			intent_id,
			trader: record.trader,
			settlement_asset: record.settlementAsset,
			recipient: record.recipient,
			amount_in: record.amountIn,
			min_amount_out: record.minAmountOut,
			commit_deadline: record.commitDeadline,
			reveal_deadline: record.revealDeadline,
			execution_deadline: record.executionDeadline,
			extra_data: record.extraData,
			state: IntentState::from(record.state),
		})
	}

	async fn next_commitment_id(&self) -> Result<u64, LedgerError> {
		let id = self.hub.nextCommitmentId().call().await.map_err(network)?;
		Ok(id.saturating_to())
	}

	async fn get_commitment(&self, commitment_id: u64) -> Result<LedgerCommitment, LedgerError> {
		let record = self
			.hub
			.getCommitment(U256::from(commitment_id))
			.call()
			.await
			.map_err(network)?;

		Ok(LedgerCommitment {
			commitment_id,
			intent_id: record.intentId.saturating_to(),
			solver: record.solver,
			payload_hash: record.payloadHash,
			collateral: record.collateral,
			state: CommitmentState::from(record.state),
			decrypted_payload: record.reveal.decryptedPayload,
		})
	}

	async fn create_intent(
		&self,
		params: &CreateIntentParams,
		value: U256,
	) -> Result<TxHash, LedgerError> {
		self.require_signer()?;

		let call_params = IIntentHub::CreateIntentParams {
			settlementAsset: params.settlement_asset,
			recipient: params.recipient,
			amountIn: params.amount_in,
			minAmountOut: params.min_amount_out,
			commitDeadline: params.commit_deadline,
			revealDeadline: params.reveal_deadline,
			executionDeadline: params.execution_deadline,
			extraData: params.extra_data.clone(),
		};

		let receipt = self
			.hub
			.createIntent(call_params)
			.value(value)
			.send()
			.await
			.map_err(|e| LedgerError::Transaction(e.to_string()))?
			.get_receipt()
			.await
			.map_err(network)?;

		settled(receipt)
	}

	async fn allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, LedgerError> {
		IERC20::new(token, self.provider.clone())
			.allowance(owner, spender)
			.call()
			.await
			.map_err(network)
	}

	async fn approve(
		&self,
		token: Address,
		spender: Address,
		amount: U256,
	) -> Result<TxHash, LedgerError> {
		self.require_signer()?;

		let receipt = IERC20::new(token, self.provider.clone())
			.approve(spender, amount)
			.send()
			.await
			.map_err(|e| LedgerError::Transaction(e.to_string()))?
			.get_receipt()
			.await
			.map_err(network)?;

		settled(receipt)
	}

	async fn commit_to_intent(
		&self,
		commitment: &SealedCommitment,
		callback_gas_limit: u32,
	) -> Result<TxHash, LedgerError> {
		self.require_signer()?;

		let ciphertext = IIntentHub::Ciphertext {
			u: IIntentHub::G2Point {
				x: commitment.ciphertext.u.x,
				y: commitment.ciphertext.u.y,
			},
			v: commitment.ciphertext.v.clone(),
			w: commitment.ciphertext.w.clone(),
		};

		let receipt = self
			.hub
			.commitToIntent(
				U256::from(commitment.intent_id),
				commitment.payload_hash,
				ciphertext,
				commitment.unlock_condition.clone(),
				callback_gas_limit,
				commitment.collateral,
			)
			.value(commitment.collateral)
			.send()
			.await
			.map_err(|e| LedgerError::Transaction(e.to_string()))?
			.get_receipt()
			.await
			.map_err(network)?;

		settled(receipt)
	}

	async fn record_execution(&self, record: &ExecutionRecord) -> Result<TxHash, LedgerError> {
		self.require_signer()?;

		let receipt = self
			.hub
			.recordExecution(
				U256::from(record.commitment_id),
				record.amount_out,
				record.fee_paid,
				record.execution_hash,
				record.success,
			)
			.send()
			.await
			.map_err(|e| LedgerError::Transaction(e.to_string()))?
			.get_receipt()
			.await
			.map_err(network)?;

		settled(receipt)
	}

	async fn watch_reveals(
		&self,
		sender: mpsc::UnboundedSender<RevealNotice>,
	) -> Result<(), LedgerError> {
		if self.is_monitoring.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		let start_block = match self.provider.get_block_number().await {
			Ok(block) => block,
			Err(e) => {
				self.is_monitoring.store(false, Ordering::SeqCst);
				return Err(network(e));
			}
		};

		let (stop_tx, stop_rx) = mpsc::channel(1);
		*self.stop_signal.lock().await = Some(stop_tx);

		let provider = self.provider.clone();
		let hub_address = self.hub_address;
		let polling_interval = self.polling_interval;

		tokio::spawn(async move {
			Self::monitoring_loop(
				provider,
				hub_address,
				start_block,
				polling_interval,
				sender,
				stop_rx,
			)
			.await;
		});

		Ok(())
	}

	async fn stop_watching(&self) -> Result<(), LedgerError> {
		if !self.is_monitoring.load(Ordering::SeqCst) {
			return Ok(());
		}

		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(()).await;
		}

		self.is_monitoring.store(false, Ordering::SeqCst);
		Ok(())
	}
}

/// Builds an [`AlloyLedger`] from its TOML table.
///
/// - `rpc_url`: HTTP JSON-RPC endpoint
/// - `intent_hub_address`: deployed intent hub
/// - `private_key` (optional): signing identity for writes
/// - `polling_interval_seconds` (optional, default 3): reveal log polling
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	AlloyLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| LedgerError::Configuration("rpc_url is required".to_string()))?;

	let hub_address = config
		.get("intent_hub_address")
		.and_then(|v| v.as_str())
		.and_then(cipherflow_types::parse_address)
		.ok_or_else(|| LedgerError::Configuration("intent_hub_address is required".to_string()))?;

	let signer = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.map(|key| {
			key.parse::<PrivateKeySigner>()
				.map_err(|e| LedgerError::Configuration(format!("Invalid private key: {}", e)))
		})
		.transpose()?;

	let polling_interval = config
		.get("polling_interval_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(3) as u64;

	let ledger = AlloyLedger::new(
		rpc_url,
		hub_address,
		signer,
		Duration::from_secs(polling_interval),
	)?;
	Ok(Box::new(ledger))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "evm";

	pub fn factory() -> crate::LedgerFactory {
		create_ledger
	}
}
