use crate::jobs::{spawn_job, FirstRun};
use crate::stats::{EngineStats, StatsSnapshot};
use crate::EngineError;
use cipherflow_commitment::{CommitOutcome, CommitmentBuilder, OpenIntentScanner};
use cipherflow_config::Config;
use cipherflow_discovery::{IngestionService, IntentQueue, Subscription};
use cipherflow_ledger::LedgerService;
use cipherflow_pricing::RoutePlanner;
use cipherflow_publisher::IntentPublisher;
use cipherflow_settlement::RevealExecutor;
use cipherflow_storage::TelemetryLog;
use cipherflow_types::{truncate_id, EventBus, TelemetryEntry};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct RoleStatus {
	pub ingestion: bool,
	pub publisher: bool,
	pub solver: bool,
	pub executor: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
	pub service_id: String,
	pub network: String,
	pub chain_id: u64,
	pub running: bool,
	pub has_signer: bool,
	pub roles: RoleStatus,
	pub queue_size: usize,
	pub published_intents: usize,
	pub pending_retries: usize,
	pub attempted_intents: usize,
	pub completed_executions: usize,
	pub in_flight_executions: usize,
	pub stats: StatsSnapshot,
}

#[derive(Default)]
pub(crate) struct Runtime {
	started: bool,
	subscription: Option<Subscription>,
	tasks: Vec<JoinHandle<()>>,
}

/// The assembled auction agents and the jobs that drive them.
pub struct AuctionEngine {
	pub(crate) config: Config,
	pub(crate) ledger: Arc<LedgerService>,
	pub(crate) events: EventBus,
	pub(crate) queue: IntentQueue,
	pub(crate) ingestion: Option<Arc<IngestionService>>,
	pub(crate) publisher: Option<Arc<IntentPublisher>>,
	pub(crate) planner: Arc<RoutePlanner>,
	pub(crate) commitments: Option<Arc<CommitmentBuilder>>,
	pub(crate) scanner: Option<Arc<OpenIntentScanner>>,
	pub(crate) executor: Option<Arc<RevealExecutor>>,
	pub(crate) telemetry: Option<Arc<TelemetryLog>>,
	pub(crate) stats: Arc<EngineStats>,
	pub(crate) token: CancellationToken,
	pub(crate) runtime: Mutex<Runtime>,
}

fn log_outcome(intent: Option<u64>, outcome: &CommitOutcome) {
	match outcome {
		CommitOutcome::NoRoute => warn!(?intent, "no route available"),
		CommitOutcome::Planned(report) => info!(
			?intent,
			venue = %report.venue,
			net_profit = %report.net_profit,
			"route planned, commitment not submitted"
		),
		CommitOutcome::Committed {
			report,
			tx_hash,
			target_block,
		} => info!(
			?intent,
			venue = %report.venue,
			tx_hash = %truncate_id(&tx_hash.to_string()),
			target_block,
			"commitment submitted"
		),
	}
}

impl AuctionEngine {
	fn runtime(&self) -> MutexGuard<'_, Runtime> {
		self.runtime.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Starts every enabled role. A second call does nothing.
	pub async fn start(&self) -> Result<(), EngineError> {
		{
			let mut runtime = self.runtime();
			if runtime.started {
				return Ok(());
			}
			runtime.started = true;
		}
		info!(service = %self.config.service.id, "starting auction engine");

		let mut tasks = vec![self
			.stats
			.spawn_collector(&self.events, self.token.clone())];

		if let Some(publisher) = &self.publisher {
			let subscription = publisher.attach(&self.queue, &self.token);
			self.runtime().subscription = Some(subscription);

			let publisher = publisher.clone();
			tasks.push(spawn_job(
				"publisher-retry",
				Duration::from_secs(self.config.publisher.retry_interval_seconds),
				FirstRun::AfterInterval,
				self.token.clone(),
				move || {
					let publisher = publisher.clone();
					async move {
						let retried = publisher.retry_pending().await;
						if retried > 0 {
							info!(retried, "retried pending publications");
						}
					}
				},
			));
		}

		if let Some(ingestion) = &self.ingestion {
			ingestion.start(&self.token);
		}

		if let Some(commitments) = &self.commitments {
			match self.config.solver.target_intent_id {
				Some(target) => {
					let commitments = commitments.clone();
					tasks.push(tokio::spawn(async move {
						match commitments.commit_once(Some(target)).await {
							Ok(outcome) => log_outcome(Some(target), &outcome),
							Err(e) => error!(intent_id = target, error = %e, "commitment attempt failed"),
						}
					}));
				}
				None => {
					if let Some(scanner) = &self.scanner {
						let scanner = scanner.clone();
						tasks.push(spawn_job(
							"open-intent-scan",
							Duration::from_secs(self.config.solver.scan_interval_seconds),
							FirstRun::Immediately,
							self.token.clone(),
							move || {
								let scanner = scanner.clone();
								async move {
									scanner.scan_once().await;
								}
							},
						));
					}
				}
			}
		}

		if let Some(executor) = &self.executor {
			executor
				.start(&self.token)
				.await
				.map_err(|e| EngineError::Service(e.to_string()))?;

			let executor = executor.clone();
			tasks.push(spawn_job(
				"reveal-sweep",
				Duration::from_secs(self.config.executor.sweep_interval_seconds),
				FirstRun::AfterInterval,
				self.token.clone(),
				move || {
					let executor = executor.clone();
					async move {
						if let Err(e) = executor.sweep().await {
							error!(error = %e, "reveal sweep failed");
						}
					}
				},
			));
		}

		self.runtime().tasks.extend(tasks);
		info!("auction engine started");
		Ok(())
	}

	/// Starts, then blocks until the shutdown token fires.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.start().await?;
		self.token.cancelled().await;
		self.shutdown().await;
		Ok(())
	}

	/// Cancels every job and waits for the ones in progress to finish.
	pub async fn shutdown(&self) {
		self.token.cancel();
		if let Some(ingestion) = &self.ingestion {
			ingestion.stop();
		}
		if let Some(executor) = &self.executor {
			executor.stop();
		}

		let tasks = {
			let mut runtime = self.runtime();
			if let Some(subscription) = runtime.subscription.take() {
				subscription.unsubscribe();
			}
			std::mem::take(&mut runtime.tasks)
		};
		for task in tasks {
			if let Err(e) = task.await {
				warn!(error = %e, "job ended abnormally");
			}
		}
		info!("auction engine stopped");
	}

	/// Token the jobs observe. Cancelling it stops the engine.
	pub fn shutdown_token(&self) -> CancellationToken {
		self.token.clone()
	}

	/// One commitment attempt against `target`, or the newest open intent.
	pub async fn commit_once(&self, target: Option<u64>) -> Result<CommitOutcome, EngineError> {
		let commitments = self
			.commitments
			.as_ref()
			.ok_or_else(|| EngineError::Config("The solver role is not enabled".into()))?;
		let outcome = commitments
			.commit_once(target)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		log_outcome(target, &outcome);
		Ok(outcome)
	}

	/// Processes every revealed commitment in the sweep window inline.
	pub async fn sweep_once(&self) -> Result<usize, EngineError> {
		let executor = self
			.executor
			.as_ref()
			.ok_or_else(|| EngineError::Config("The executor role is not enabled".into()))?;
		executor
			.reconcile_once()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))
	}

	pub fn status(&self) -> EngineStatus {
		let running = self.runtime().started && !self.token.is_cancelled();
		EngineStatus {
			service_id: self.config.service.id.clone(),
			network: self.config.network.name.clone(),
			chain_id: self.config.network.chain_id,
			running,
			has_signer: self.ledger.has_signer(),
			roles: RoleStatus {
				ingestion: self.ingestion.is_some(),
				publisher: self.publisher.is_some(),
				solver: self.commitments.is_some(),
				executor: self.executor.is_some(),
			},
			queue_size: self.queue.size(),
			published_intents: self.publisher.as_ref().map_or(0, |p| p.published_count()),
			pending_retries: self.publisher.as_ref().map_or(0, |p| p.pending_retries()),
			attempted_intents: self.scanner.as_ref().map_or(0, |s| s.attempted_count()),
			completed_executions: self.executor.as_ref().map_or(0, |e| e.completed_count()),
			in_flight_executions: self.executor.as_ref().map_or(0, |e| e.in_flight_count()),
			stats: self.stats.snapshot(),
		}
	}

	/// Newest first; empty when the solver role is off.
	pub async fn telemetry_entries(&self) -> Vec<TelemetryEntry> {
		match &self.telemetry {
			Some(telemetry) => telemetry.list().await,
			None => Vec::new(),
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	pub fn queue(&self) -> &IntentQueue {
		&self.queue
	}

	pub fn planner(&self) -> &Arc<RoutePlanner> {
		&self.planner
	}

	pub fn telemetry(&self) -> Option<&Arc<TelemetryLog>> {
		self.telemetry.as_ref()
	}
}

#[cfg(test)]
mod tests {
	use crate::builder::tests::config;
	use crate::AuctionBuilder;
	use alloy::primitives::{Address, Bytes, U256};
	use cipherflow_commitment::CommitOutcome;
	use cipherflow_ledger::implementations::memory::InMemoryLedger;
	use cipherflow_types::{
		current_timestamp, IntentExtraData, IntentState, LedgerIntent, TelemetryStatus,
	};
	use std::time::Duration;

	const SOLVER: Address = Address::new([0x5a; 20]);

	const ROLES: &str = r#"
[discovery]
enabled = false

[publisher]
enabled = false

[solver]
enabled = true
collateral_wei = "1000"

[executor]
enabled = true
"#;

	fn open_intent() -> LedgerIntent {
		let now = current_timestamp();
		LedgerIntent {
			intent_id: 0,
			trader: Address::repeat_byte(0x11),
			settlement_asset: Address::repeat_byte(0x33),
			recipient: Address::repeat_byte(0x11),
			amount_in: U256::from(1000u64),
			min_amount_out: U256::from(1u64),
			commit_deadline: now + 3_600,
			reveal_deadline: now + 3_660,
			execution_deadline: now + 7_200,
			extra_data: IntentExtraData {
				external_id: "order-7".into(),
				source: "cow".into(),
				..Default::default()
			}
			.encode()
			.unwrap(),
			state: IntentState::Open,
		}
	}

	async fn engine_with(ledger: &InMemoryLedger, extra: &str) -> crate::AuctionEngine {
		AuctionBuilder::new(config(extra))
			.with_default_implementations()
			.with_ledger(Box::new(ledger.clone()))
			.build()
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn test_commit_then_sweep() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		let intent_id = ledger.insert_intent(open_intent());
		let engine = engine_with(&ledger, ROLES).await;

		let outcome = engine.commit_once(Some(intent_id)).await.unwrap();
		assert!(matches!(outcome, CommitOutcome::Committed { .. }));
		let commitments = ledger.commitments();
		assert_eq!(commitments.len(), 1);

		let entries = engine.telemetry_entries().await;
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].status, TelemetryStatus::Committed);
		assert_eq!(entries[1].status, TelemetryStatus::Planned);

		ledger
			.reveal(commitments[0].commitment_id, Bytes::new())
			.unwrap();
		assert_eq!(engine.sweep_once().await.unwrap(), 1);
		assert_eq!(ledger.executions().len(), 1);
		assert_eq!(engine.status().completed_executions, 1);
	}

	#[tokio::test]
	async fn test_disabled_roles_are_reported() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		let engine = engine_with(&ledger, "").await;

		assert!(engine.commit_once(None).await.is_err());
		assert!(engine.sweep_once().await.is_err());
		assert!(engine.telemetry_entries().await.is_empty());
	}

	#[tokio::test]
	async fn test_start_and_shutdown() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		ledger.insert_intent(open_intent());
		let engine = engine_with(&ledger, ROLES).await;

		engine.start().await.unwrap();
		engine.start().await.unwrap();
		assert!(engine.status().running);
		assert_eq!(ledger.watcher_count(), 1);

		for _ in 0..100 {
			if !ledger.commitments().is_empty() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert_eq!(ledger.commitments().len(), 1);

		engine.shutdown().await;
		let status = engine.status();
		assert!(!status.running);
		assert_eq!(status.attempted_intents, 1);
	}

	#[tokio::test]
	async fn test_revealed_commitment_is_executed_by_watcher() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		let intent_id = ledger.insert_intent(open_intent());
		let engine = engine_with(&ledger, ROLES).await;
		engine.commit_once(Some(intent_id)).await.unwrap();

		engine.start().await.unwrap();
		let commitment_id = ledger.commitments()[0].commitment_id;
		ledger.reveal(commitment_id, Bytes::new()).unwrap();

		for _ in 0..100 {
			if !ledger.executions().is_empty() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert_eq!(ledger.executions().len(), 1);
		engine.shutdown().await;
	}
}
