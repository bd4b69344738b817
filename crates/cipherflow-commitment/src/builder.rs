//! Plan, seal and submit one commitment.

use crate::{encode_condition, CommitmentError, TimelockInterface, DEFAULT_PAYLOAD_LIMIT};
use alloy::primitives::{keccak256, Address, TxHash, U256};
use cipherflow_ledger::LedgerService;
use cipherflow_pricing::RoutePlanner;
use cipherflow_storage::TelemetryLog;
use cipherflow_types::{
	current_timestamp, current_timestamp_millis, truncate_id, AuctionEvent, ChainId,
	CommitmentEvent, EventBus, IntentState, LedgerIntent, ProfitReport, RoutePayload,
	SealedCommitment, SwapIntentDefinition, TelemetryEntry, DEFAULT_CHAIN_ID,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const DEFAULT_CALLBACK_GAS_LIMIT: u32 = 300_000;
pub const DEFAULT_MAX_INTENT_SCAN: u64 = 25;
pub const DEFAULT_NO_ROUTE_RETRY: Duration = Duration::from_secs(300);

/// Operator-supplied replacements for what the intent's metadata says.
#[derive(Debug, Clone, Default)]
pub struct SwapOverrides {
	pub from_token: Option<String>,
	pub to_token: Option<String>,
	pub source_chain_id: Option<ChainId>,
	pub destination_chain_id: Option<ChainId>,
}

#[derive(Debug, Clone)]
pub struct CommitmentSettings {
	/// Posted with every commitment; must be positive.
	pub collateral: U256,
	pub callback_gas_limit: u32,
	pub payload_limit: usize,
	pub planning_only: bool,
	pub max_intent_scan: u64,
	/// How long the open-intent scan waits before retrying an intent no
	/// connector could quote.
	pub no_route_retry: Duration,
	pub overrides: SwapOverrides,
}

impl CommitmentSettings {
	pub fn new(collateral: U256) -> Self {
		Self {
			collateral,
			callback_gas_limit: DEFAULT_CALLBACK_GAS_LIMIT,
			payload_limit: DEFAULT_PAYLOAD_LIMIT,
			planning_only: false,
			max_intent_scan: DEFAULT_MAX_INTENT_SCAN,
			no_route_retry: DEFAULT_NO_ROUTE_RETRY,
			overrides: SwapOverrides::default(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
	/// No connector produced a quote.
	NoRoute,
	/// Route chosen but nothing written (`planning_only`).
	Planned(ProfitReport),
	Committed {
		report: ProfitReport,
		tx_hash: TxHash,
		target_block: u64,
	},
}

pub struct CommitmentBuilder {
	ledger: Arc<LedgerService>,
	planner: Arc<RoutePlanner>,
	timelock: Arc<dyn TimelockInterface>,
	telemetry: Arc<TelemetryLog>,
	settings: CommitmentSettings,
	events: Option<EventBus>,
}

impl CommitmentBuilder {
	pub fn new(
		ledger: Arc<LedgerService>,
		planner: Arc<RoutePlanner>,
		timelock: Arc<dyn TimelockInterface>,
		telemetry: Arc<TelemetryLog>,
		settings: CommitmentSettings,
	) -> Result<Self, CommitmentError> {
		if settings.collateral.is_zero() {
			return Err(CommitmentError::Configuration(
				"collateral must be positive".to_string(),
			));
		}
		Ok(Self {
			ledger,
			planner,
			timelock,
			telemetry,
			settings,
			events: None,
		})
	}

	pub fn with_event_bus(mut self, events: EventBus) -> Self {
		self.events = Some(events);
		self
	}

	pub fn settings(&self) -> &CommitmentSettings {
		&self.settings
	}

	pub fn ledger(&self) -> &Arc<LedgerService> {
		&self.ledger
	}

	pub fn telemetry(&self) -> &Arc<TelemetryLog> {
		&self.telemetry
	}

	/// Resolves `target`, or the newest open intent when `None`, and
	/// commits to it.
	pub async fn commit_once(&self, target: Option<u64>) -> Result<CommitOutcome, CommitmentError> {
		let definition = self.resolve_target(target).await?;
		self.submit(&definition).await
	}

	pub async fn resolve_target(
		&self,
		target: Option<u64>,
	) -> Result<SwapIntentDefinition, CommitmentError> {
		let now = current_timestamp();
		let intent = match target {
			Some(intent_id) => self.ledger.get_intent(intent_id).await?,
			None => self
				.ledger
				.find_open_intent(self.settings.max_intent_scan, now)
				.await?
				.ok_or_else(|| {
					CommitmentError::InvalidTarget(
						"no open intents found and no target intent id provided".to_string(),
					)
				})?,
		};

		if !intent.exists() {
			return Err(CommitmentError::InvalidTarget(format!(
				"intent {} not found",
				intent.intent_id
			)));
		}
		if intent.commit_deadline <= now {
			return Err(CommitmentError::InvalidTarget(format!(
				"intent {} commit window already closed",
				intent.intent_id
			)));
		}
		if intent.state != IntentState::Open {
			return Err(CommitmentError::InvalidTarget(format!(
				"intent {} is not open (state {:?})",
				intent.intent_id, intent.state
			)));
		}

		Ok(self.swap_definition(&intent))
	}

	/// Joins the ledger record, its `extraData` metadata and the overrides.
	pub fn swap_definition(&self, intent: &LedgerIntent) -> SwapIntentDefinition {
		let overrides = &self.settings.overrides;
		let mut metadata = intent.extra().map(|extra| extra.metadata).unwrap_or_default();
		metadata.commit_deadline = Some(intent.commit_deadline);
		metadata.reveal_deadline = Some(intent.reveal_deadline);
		metadata.execution_deadline = Some(intent.execution_deadline);

		let settlement_asset = intent.settlement_asset.to_string();
		let from_token = overrides
			.from_token
			.clone()
			.or_else(|| metadata.from_token.clone())
			.unwrap_or_else(|| settlement_asset.clone());
		let to_token = overrides
			.to_token
			.clone()
			.or_else(|| metadata.to_token.clone())
			.unwrap_or(settlement_asset);

		SwapIntentDefinition {
			intent_id: intent.intent_id,
			commitment_id: None,
			from_token,
			to_token,
			amount_in: intent.amount_in,
			min_amount_out: intent.min_amount_out,
			source_chain_id: overrides
				.source_chain_id
				.or(metadata.source_chain_id)
				.unwrap_or(DEFAULT_CHAIN_ID),
			destination_chain_id: overrides
				.destination_chain_id
				.or(metadata.destination_chain_id),
			metadata,
		}
	}

	/// Plans a route for `intent` and submits the sealed commitment.
	///
	/// Telemetry gets `planned` before anything is sealed, then exactly one
	/// of `committed` or `failed`. Errors are returned after being recorded.
	#[instrument(skip_all, fields(intent_id = intent.intent_id))]
	pub async fn submit(&self, intent: &SwapIntentDefinition) -> Result<CommitOutcome, CommitmentError> {
		let Some(report) = self.planner.plan_best_route(intent).await else {
			warn!("no profitable routes discovered");
			return Ok(CommitOutcome::NoRoute);
		};

		if self.settings.planning_only {
			info!(
				venue = %report.venue,
				net_profit = %report.net_profit,
				"planning only, commitment not submitted"
			);
			return Ok(CommitOutcome::Planned(report));
		}

		let planned = TelemetryEntry::planned(intent.intent_id, &report);
		self.record(intent.intent_id, planned.clone()).await;

		match self.seal_and_commit(intent, &report).await {
			Ok((tx_hash, target_block)) => {
				info!(
					tx_hash = %truncate_id(&tx_hash.to_string()),
					target_block,
					venue = %report.venue,
					"commitment submitted"
				);
				self.record(intent.intent_id, planned.committed(tx_hash.to_string()))
					.await;
				Ok(CommitOutcome::Committed {
					report,
					tx_hash,
					target_block,
				})
			}
			Err(e) => {
				self.record(intent.intent_id, planned.failed(e.to_string())).await;
				Err(e)
			}
		}
	}

	async fn seal_and_commit(
		&self,
		intent: &SwapIntentDefinition,
		report: &ProfitReport,
	) -> Result<(TxHash, u64), CommitmentError> {
		let solver = self.ledger.operator_address().unwrap_or(Address::ZERO);
		let payload = RoutePayload {
			intent_id: intent.intent_id.to_string(),
			solver: solver.to_string(),
			venue: report.venue.to_string(),
			amount_in: intent.amount_in.to_string(),
			min_amount_out: intent.min_amount_out.to_string(),
			amount_out: report.amount_out.to_string(),
			gas: report.gas_cost.to_string(),
			bridge_fee: report.bridge_fee.to_string(),
			timestamp: current_timestamp_millis(),
		};
		let plaintext = payload
			.to_bytes()
			.map_err(|e| CommitmentError::Serialization(e.to_string()))?;

		if plaintext.len() > self.settings.payload_limit {
			return Err(CommitmentError::PayloadTooLarge {
				size: plaintext.len(),
				limit: self.settings.payload_limit,
			});
		}

		let target_block = self.ledger.block_number().await? + 1;
		let ciphertext = self.timelock.encrypt(&plaintext, target_block).await?;

		let commitment = SealedCommitment {
			intent_id: intent.intent_id,
			solver,
			payload_hash: keccak256(&plaintext),
			ciphertext,
			unlock_condition: encode_condition(target_block),
			target_block,
			collateral: self.settings.collateral,
		};

		let tx_hash = self
			.ledger
			.commit_to_intent(&commitment, self.settings.callback_gas_limit)
			.await?;
		Ok((tx_hash, target_block))
	}

	async fn record(&self, intent_id: u64, entry: TelemetryEntry) {
		let status = entry.status;
		let tx_hash = entry.tx_hash.clone();
		self.telemetry.append(entry).await;
		if let Some(events) = &self.events {
			events.publish(AuctionEvent::Commitment(CommitmentEvent::Recorded {
				intent_id,
				status,
				tx_hash,
			}));
		}
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::implementations::mock::PlaintextTimelock;
	use crate::{MockTimelockInterface, TimelockError};
	use alloy::primitives::{Bytes, B256};
	use cipherflow_ledger::implementations::memory::InMemoryLedger;
	use cipherflow_ledger::LedgerInterface;
	use cipherflow_pricing::{MockQuoteConnector, QuoteConnector};
	use cipherflow_types::{
		CommitmentState, IntentExtraData, IntentMetadata, QuoteLeg, QuoteResult, TelemetryStatus,
		Venue,
	};

	pub(crate) const SOLVER: Address = Address::new([0x5a; 20]);

	pub(crate) fn open_intent(amount_in: U256, metadata: IntentMetadata) -> LedgerIntent {
		let now = current_timestamp();
		LedgerIntent {
			intent_id: 0,
			trader: Address::repeat_byte(0x11),
			settlement_asset: Address::repeat_byte(0x33),
			recipient: Address::repeat_byte(0x11),
			amount_in,
			min_amount_out: U256::from(1u64),
			commit_deadline: now + 3_600,
			reveal_deadline: now + 3_660,
			execution_deadline: now + 7_200,
			extra_data: IntentExtraData {
				external_id: "order-1".into(),
				source: "cow".into(),
				metadata,
				..Default::default()
			}
			.encode()
			.unwrap(),
			state: IntentState::Open,
		}
	}

	pub(crate) fn planner_quoting(out: U256) -> Arc<RoutePlanner> {
		let mut connector = MockQuoteConnector::new();
		connector.expect_venue().return_const(Venue::Uniswap);
		connector.expect_get_quote().returning(move |request| {
			let quote = QuoteResult {
				leg: QuoteLeg {
					venue: Venue::Uniswap,
					chain_id: request.chain_id,
					expected_amount_out: out,
					gas_estimate: U256::from(100u64),
					target: Address::ZERO,
					call_data: Bytes::new(),
					bridge_fee: U256::ZERO,
					context: Default::default(),
				},
				quote_timestamp: 1,
				warnings: vec![],
			};
			Box::pin(async move { Ok(Some(quote)) })
		});
		let connectors: Vec<Arc<dyn QuoteConnector>> = vec![Arc::new(connector)];
		Arc::new(RoutePlanner::new(connectors, U256::from(1u64)))
	}

	pub(crate) fn builder(
		ledger: &InMemoryLedger,
		planner: Arc<RoutePlanner>,
		settings: CommitmentSettings,
	) -> CommitmentBuilder {
		CommitmentBuilder::new(
			Arc::new(LedgerService::new(Box::new(ledger.clone()))),
			planner,
			Arc::new(PlaintextTimelock),
			Arc::new(TelemetryLog::in_memory(50)),
			settings,
		)
		.unwrap()
	}

	#[tokio::test]
	async fn test_commit_seals_payload_and_posts_collateral() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::repeat_byte(0xee));
		let intent_id = ledger.insert_intent(open_intent(
			U256::from(1_000u64),
			IntentMetadata {
				from_token: Some("WETH".into()),
				to_token: Some("USDC".into()),
				..Default::default()
			},
		));
		let builder = builder(
			&ledger,
			planner_quoting(U256::from(1_010u64)),
			CommitmentSettings::new(U256::from(7u64)),
		);
		let block_before = ledger.block_number().await.unwrap();

		let outcome = builder.commit_once(None).await.unwrap();
		let CommitOutcome::Committed { target_block, .. } = outcome else {
			panic!("expected a commitment, got {:?}", outcome);
		};
		assert_eq!(target_block, block_before + 1);

		let commitments = ledger.commitments();
		assert_eq!(commitments.len(), 1);
		assert_eq!(commitments[0].intent_id, intent_id);
		assert_eq!(commitments[0].collateral, U256::from(7u64));
		assert_eq!(commitments[0].state, CommitmentState::Committed);
		assert_ne!(commitments[0].payload_hash, B256::ZERO);

		let entries = builder.telemetry().list().await;
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].status, TelemetryStatus::Committed);
		assert!(entries[0].tx_hash.is_some());
		assert_eq!(entries[1].status, TelemetryStatus::Planned);
		assert_eq!(entries[0].id, entries[1].id);
	}

	#[tokio::test]
	async fn test_oversized_payload_fails_before_any_ledger_call() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		let huge = U256::MAX >> 4;
		ledger.insert_intent(open_intent(huge, IntentMetadata::default()));
		let builder = builder(&ledger, planner_quoting(huge), CommitmentSettings::new(U256::from(1u64)));
		let block_before = ledger.block_number().await.unwrap();

		let result = builder.commit_once(Some(1)).await;
		assert!(matches!(
			result,
			Err(CommitmentError::PayloadTooLarge { limit: 256, .. })
		));
		assert!(ledger.commitments().is_empty());
		assert_eq!(ledger.block_number().await.unwrap(), block_before);

		let entries = builder.telemetry().list().await;
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].status, TelemetryStatus::Failed);
		assert!(entries[0].error.as_deref().unwrap().contains("limit is 256"));
	}

	#[tokio::test]
	async fn test_ledger_revert_is_recorded_and_returned() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		ledger.insert_intent(open_intent(U256::from(10u64), IntentMetadata::default()));
		ledger.fail_next_writes(1);
		let builder = builder(
			&ledger,
			planner_quoting(U256::from(11u64)),
			CommitmentSettings::new(U256::from(1u64)),
		);

		assert!(matches!(
			builder.commit_once(Some(1)).await,
			Err(CommitmentError::Ledger(_))
		));
		let entries = builder.telemetry().list().await;
		assert_eq!(entries[0].status, TelemetryStatus::Failed);
	}

	#[tokio::test]
	async fn test_timelock_failure_is_recorded() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		ledger.insert_intent(open_intent(U256::from(10u64), IntentMetadata::default()));
		let mut timelock = MockTimelockInterface::new();
		timelock.expect_encrypt().returning(|_, _| {
			Box::pin(async move { Err(TimelockError::Encryption("endpoint down".into())) })
		});
		let builder = CommitmentBuilder::new(
			Arc::new(LedgerService::new(Box::new(ledger.clone()))),
			planner_quoting(U256::from(11u64)),
			Arc::new(timelock),
			Arc::new(TelemetryLog::in_memory(50)),
			CommitmentSettings::new(U256::from(1u64)),
		)
		.unwrap();

		assert!(matches!(
			builder.commit_once(Some(1)).await,
			Err(CommitmentError::Timelock(_))
		));
		assert!(ledger.commitments().is_empty());
	}

	#[tokio::test]
	async fn test_planning_only_writes_nothing() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		ledger.insert_intent(open_intent(U256::from(10u64), IntentMetadata::default()));
		let mut settings = CommitmentSettings::new(U256::from(1u64));
		settings.planning_only = true;
		let builder = builder(&ledger, planner_quoting(U256::from(11u64)), settings);

		assert!(matches!(
			builder.commit_once(None).await.unwrap(),
			CommitOutcome::Planned(_)
		));
		assert!(builder.telemetry().list().await.is_empty());
		assert!(ledger.commitments().is_empty());
	}

	#[tokio::test]
	async fn test_target_rejections() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		let mut closed = open_intent(U256::from(10u64), IntentMetadata::default());
		closed.commit_deadline = 1;
		ledger.insert_intent(closed);
		let mut settled = open_intent(U256::from(10u64), IntentMetadata::default());
		settled.state = IntentState::Settled;
		ledger.insert_intent(settled);
		let builder = builder(
			&ledger,
			planner_quoting(U256::from(11u64)),
			CommitmentSettings::new(U256::from(1u64)),
		);

		for target in [Some(1), Some(2), Some(9), None] {
			assert!(
				matches!(
					builder.commit_once(target).await,
					Err(CommitmentError::InvalidTarget(_))
				),
				"target {:?}",
				target
			);
		}
	}

	#[test]
	fn test_zero_collateral_is_rejected() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		let result = CommitmentBuilder::new(
			Arc::new(LedgerService::new(Box::new(ledger))),
			Arc::new(RoutePlanner::default()),
			Arc::new(PlaintextTimelock),
			Arc::new(TelemetryLog::in_memory(50)),
			CommitmentSettings::new(U256::ZERO),
		);
		assert!(matches!(result, Err(CommitmentError::Configuration(_))));
	}

	#[test]
	fn test_swap_definition_precedence() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		let mut settings = CommitmentSettings::new(U256::from(1u64));
		settings.overrides.to_token = Some("DAI".into());
		settings.overrides.destination_chain_id = Some(10);
		let builder = builder(&ledger, Arc::new(RoutePlanner::default()), settings);

		let mut intent = open_intent(
			U256::from(10u64),
			IntentMetadata {
				to_token: Some("USDC".into()),
				source_chain_id: Some(8453),
				..Default::default()
			},
		);
		intent.intent_id = 4;
		let definition = builder.swap_definition(&intent);

		assert_eq!(definition.from_token, Address::repeat_byte(0x33).to_string());
		assert_eq!(definition.to_token, "DAI");
		assert_eq!(definition.source_chain_id, 8453);
		assert_eq!(definition.destination_chain_id, Some(10));
		assert_eq!(definition.quote_chain_id(), 10);
		assert_eq!(definition.metadata.commit_deadline, Some(intent.commit_deadline));

		intent.extra_data = Bytes::from_static(b"garbage");
		let fallback = builder.swap_definition(&intent);
		assert_eq!(fallback.source_chain_id, DEFAULT_CHAIN_ID);
	}
}
