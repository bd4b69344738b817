//! Reveal watcher and executor.
//!
//! Reveals are discovered two ways: the ledger's notification stream and a
//! bounded sweep for commitments still in the `Revealed` state. Both paths
//! funnel into the same claim so a commitment is processed by at most one
//! task at a time and completed at most once. A commitment whose processing
//! fails is released unclaimed and picked up again by the next discovery.

use crate::{ExecutionInterface, ExecutionOutcome, ExecutorError};
use alloy::primitives::{Address, Bytes, B256, U256};
use cipherflow_ledger::LedgerService;
use cipherflow_types::{
	current_timestamp_millis, net_of, AuctionEvent, ChainId, EventBus, ExecutionEvent,
	ExecutionRecord, LedgerIntent, ProfitReport, QuoteLeg, RevealNotice, RoutePayload,
	SwapIntentDefinition, Venue, DEFAULT_CHAIN_ID, DEFAULT_GAS_PRICE_WEI,
};
use dashmap::{DashMap, DashSet};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_MAX_COMMITMENT_SCAN: u64 = 25;
pub const DEFAULT_SWEEP_LIMIT: usize = 20;
/// Gas assumed for a route whose payload does not carry an estimate.
pub const DEFAULT_ROUTE_GAS: u64 = 150_000;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
	pub max_commitment_scan: u64,
	pub sweep_limit: usize,
	pub default_chain_id: ChainId,
	pub gas_price_wei: U256,
}

impl Default for ExecutorConfig {
	fn default() -> Self {
		Self {
			max_commitment_scan: DEFAULT_MAX_COMMITMENT_SCAN,
			sweep_limit: DEFAULT_SWEEP_LIMIT,
			default_chain_id: DEFAULT_CHAIN_ID,
			gas_price_wei: U256::from(DEFAULT_GAS_PRICE_WEI),
		}
	}
}

#[derive(Debug, Clone)]
pub struct ExecutionSummary {
	pub commitment_id: u64,
	pub intent_id: u64,
	pub outcome: ExecutionOutcome,
	pub report: ProfitReport,
	/// Whether the outcome was written back to the ledger.
	pub recorded: bool,
}

pub struct RevealExecutor {
	ledger: Arc<LedgerService>,
	execution: Arc<dyn ExecutionInterface>,
	config: ExecutorConfig,
	completed: DashSet<u64>,
	/// Commitment id to the millisecond timestamp its processing started.
	in_flight: DashMap<u64, u64>,
	events: Option<EventBus>,
	watching: Mutex<Option<CancellationToken>>,
}

impl RevealExecutor {
	pub fn new(
		ledger: Arc<LedgerService>,
		execution: Arc<dyn ExecutionInterface>,
		config: ExecutorConfig,
	) -> Self {
		Self {
			ledger,
			execution,
			config,
			completed: DashSet::new(),
			in_flight: DashMap::new(),
			events: None,
			watching: Mutex::new(None),
		}
	}

	pub fn with_event_bus(mut self, events: EventBus) -> Self {
		self.events = Some(events);
		self
	}

	pub fn config(&self) -> &ExecutorConfig {
		&self.config
	}

	pub fn is_completed(&self, commitment_id: u64) -> bool {
		self.completed.contains(&commitment_id)
	}

	pub fn completed_count(&self) -> usize {
		self.completed.len()
	}

	pub fn in_flight_count(&self) -> usize {
		self.in_flight.len()
	}

	fn try_claim(&self, commitment_id: u64) -> bool {
		if self.completed.contains(&commitment_id) {
			return false;
		}
		match self.in_flight.entry(commitment_id) {
			dashmap::mapref::entry::Entry::Occupied(_) => false,
			dashmap::mapref::entry::Entry::Vacant(slot) => {
				slot.insert(current_timestamp_millis());
				true
			}
		}
	}

	/// Processes a claimed commitment and releases the claim. Returns
	/// whether the commitment is now completed.
	async fn finish(&self, notice: RevealNotice) -> bool {
		let commitment_id = notice.commitment_id;
		if self.completed.contains(&commitment_id) {
			self.in_flight.remove(&commitment_id);
			return false;
		}

		let done = match self
			.process_commitment(commitment_id, Some(notice.intent_id))
			.await
		{
			Ok(summary) => {
				self.completed.insert(commitment_id);
				self.publish(ExecutionEvent::Completed {
					commitment_id,
					intent_id: summary.intent_id,
					recorded: summary.recorded,
				});
				true
			}
			Err(ExecutorError::MissingIntent(reason)) => {
				warn!(commitment_id, reason = %reason, "skipping commitment");
				false
			}
			Err(e) => {
				error!(commitment_id, error = %e, "commitment processing failed");
				self.publish(ExecutionEvent::Failed {
					commitment_id,
					error: e.to_string(),
				});
				false
			}
		};

		self.in_flight.remove(&commitment_id);
		done
	}

	fn publish(&self, event: ExecutionEvent) {
		if let Some(events) = &self.events {
			events.publish(AuctionEvent::Execution(event));
		}
	}

	/// Claims the commitment and processes it on a new task. Returns `false`
	/// when it is already completed or in flight.
	pub fn schedule(self: &Arc<Self>, notice: RevealNotice) -> bool {
		if !self.try_claim(notice.commitment_id) {
			debug!(commitment_id = notice.commitment_id, "already handled or in flight");
			return false;
		}
		let executor = Arc::clone(self);
		tokio::spawn(async move {
			executor.finish(notice).await;
		});
		true
	}

	/// Fetches, rebuilds and executes one revealed commitment, then reports
	/// the outcome if the ledger has a signing identity. `hinted_intent_id`
	/// takes priority over the intent id stored on the commitment.
	#[instrument(skip(self))]
	pub async fn process_commitment(
		&self,
		commitment_id: u64,
		hinted_intent_id: Option<u64>,
	) -> Result<ExecutionSummary, ExecutorError> {
		let record = self.ledger.get_commitment(commitment_id).await?;
		let intent_id = hinted_intent_id.unwrap_or(record.intent_id);
		if intent_id == 0 {
			return Err(ExecutorError::MissingIntent(format!(
				"commitment {} carries no intent id",
				commitment_id
			)));
		}

		let intent = self.ledger.get_intent(intent_id).await?;
		let payload = RoutePayload::decode(&record.decrypted_payload).unwrap_or_else(|| {
			if !record.decrypted_payload.is_empty() {
				warn!(commitment_id, "revealed payload is not readable, using defaults");
			}
			RoutePayload::default()
		});

		let (definition, report, leg) =
			reconstruct_route(commitment_id, &intent, &payload, &self.config);
		let outcome = self.execution.execute(&definition, &report, &leg).await?;

		let recorded = if self.ledger.has_signer() {
			let tx_hash = self
				.ledger
				.record_execution(&ExecutionRecord {
					commitment_id,
					amount_out: report.amount_out,
					fee_paid: U256::ZERO,
					execution_hash: B256::ZERO,
					success: true,
				})
				.await?;
			info!(commitment_id, intent_id, tx_hash = %tx_hash, "recorded execution");
			true
		} else {
			info!(
				commitment_id,
				intent_id,
				amount_out = %report.amount_out,
				"execution simulated, no signer configured"
			);
			false
		};

		Ok(ExecutionSummary {
			commitment_id,
			intent_id,
			outcome,
			report,
			recorded,
		})
	}

	/// Finds revealed commitments and schedules each. Returns how many were
	/// newly scheduled.
	pub async fn sweep(self: &Arc<Self>) -> Result<usize, ExecutorError> {
		let notices = self
			.ledger
			.collect_revealed_commitments(self.config.max_commitment_scan, self.config.sweep_limit)
			.await?;
		let scheduled = notices.into_iter().filter(|n| self.schedule(*n)).count();
		if scheduled > 0 {
			info!(scheduled, "reveal sweep scheduled commitments");
		}
		Ok(scheduled)
	}

	/// Sweep that processes each commitment in turn on the calling task.
	/// Returns how many were completed.
	pub async fn reconcile_once(&self) -> Result<usize, ExecutorError> {
		let notices = self
			.ledger
			.collect_revealed_commitments(self.config.max_commitment_scan, self.config.sweep_limit)
			.await?;

		let mut completed = 0;
		for notice in notices {
			if self.try_claim(notice.commitment_id) && self.finish(notice).await {
				completed += 1;
			}
		}
		Ok(completed)
	}

	/// Subscribes to reveal notifications and runs a bootstrap sweep. A
	/// second call while watching does nothing.
	pub async fn start(self: &Arc<Self>, shutdown: &CancellationToken) -> Result<(), ExecutorError> {
		let token = {
			let mut watching = self.watching.lock().unwrap_or_else(|e| e.into_inner());
			if watching.is_some() {
				return Ok(());
			}
			let token = shutdown.child_token();
			*watching = Some(token.clone());
			token
		};

		let (sender, mut receiver) = mpsc::unbounded_channel();
		if let Err(e) = self.ledger.watch_reveals(sender).await {
			self.watching
				.lock()
				.unwrap_or_else(|e| e.into_inner())
				.take();
			return Err(e.into());
		}

		let executor = Arc::clone(self);
		tokio::spawn(async move {
			info!("reveal watcher started");
			if let Err(e) = executor.sweep().await {
				error!(error = %e, "bootstrap sweep failed");
			}

			loop {
				tokio::select! {
					_ = token.cancelled() => break,
					notice = receiver.recv() => match notice {
						Some(notice) => {
							info!(
								commitment_id = notice.commitment_id,
								intent_id = notice.intent_id,
								"reveal observed"
							);
							executor.schedule(notice);
						}
						None => break,
					},
				}
			}

			if let Err(e) = executor.ledger.stop_watching().await {
				warn!(error = %e, "failed to stop reveal subscription");
			}
			info!("reveal watcher stopped");
		});
		Ok(())
	}

	/// Cancels the reveal subscription. Work already scheduled drains.
	pub fn stop(&self) {
		let token = self
			.watching
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.take();
		if let Some(token) = token {
			token.cancel();
		}
	}

	pub fn is_watching(&self) -> bool {
		self.watching
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.is_some()
	}
}

/// Rebuilds the execution context of a revealed commitment.
///
/// Ledger amounts win over the payload, payload figures over defaults.
/// Tokens and chains come from the intent's metadata, falling back to the
/// settlement asset and `default_chain_id`.
pub fn reconstruct_route(
	commitment_id: u64,
	intent: &LedgerIntent,
	payload: &RoutePayload,
	config: &ExecutorConfig,
) -> (SwapIntentDefinition, ProfitReport, QuoteLeg) {
	let extra = intent.extra().unwrap_or_default();
	let metadata = extra.metadata.clone();

	let settlement_token = intent.settlement_asset.to_string();
	let from_token = metadata
		.from_token
		.clone()
		.unwrap_or_else(|| settlement_token.clone());
	let to_token = metadata.to_token.clone().unwrap_or(settlement_token);
	let source_chain_id = metadata.source_chain_id.unwrap_or(config.default_chain_id);
	let destination_chain_id = metadata.destination_chain_id;

	let amount_out = payload.amount_out().unwrap_or(intent.min_amount_out);
	let gas = payload.gas().unwrap_or(U256::from(DEFAULT_ROUTE_GAS));
	let bridge_fee = payload.bridge_fee().unwrap_or(U256::ZERO);
	let venue = payload.venue().map(Venue::from_name).unwrap_or(Venue::Unknown);

	let mut context = Map::new();
	if let Ok(value) = serde_json::to_value(payload) {
		context.insert("payload".to_string(), value);
	}
	if !extra.external_id.is_empty() {
		context.insert("externalId".to_string(), Value::String(extra.external_id.clone()));
	}

	let definition = SwapIntentDefinition {
		intent_id: intent.intent_id,
		commitment_id: Some(commitment_id),
		from_token,
		to_token,
		amount_in: intent.amount_in,
		min_amount_out: intent.min_amount_out,
		source_chain_id,
		destination_chain_id,
		metadata,
	};

	let report = ProfitReport {
		venue,
		amount_in: intent.amount_in,
		amount_out,
		gas_cost: gas.saturating_mul(config.gas_price_wei),
		bridge_fee,
		net_profit: net_of(amount_out, &[intent.amount_in, bridge_fee]),
		quote_issued_at: payload.timestamp().unwrap_or_default(),
		warnings: vec![],
	};

	let leg = QuoteLeg {
		venue,
		chain_id: definition.quote_chain_id(),
		expected_amount_out: amount_out,
		gas_estimate: gas,
		target: Address::ZERO,
		call_data: Bytes::new(),
		bridge_fee,
		context,
	};

	(definition, report, leg)
}
