use crate::engine::AuctionEngine;
use crate::stats::EngineStats;
use crate::EngineError;
use alloy::primitives::U256;
use cipherflow_commitment::{
	CommitmentBuilder, CommitmentSettings, OpenIntentScanner, SwapOverrides, TimelockFactory,
};
use cipherflow_config::Config;
use cipherflow_discovery::{IngestionConfig, IngestionService, IntentQueue, SourceFactory};
use cipherflow_ledger::{LedgerFactory, LedgerInterface, LedgerService};
use cipherflow_pricing::{ConnectorFactory, QuoteConnector, RoutePlanner};
use cipherflow_publisher::{IntentPublisher, PublisherConfig, SettlementAsset};
use cipherflow_settlement::{ExecutionFactory, ExecutorConfig, RevealExecutor};
use cipherflow_storage::{DedupCache, StorageFactory, StorageService, TelemetryLog};
use cipherflow_types::utils::parse_amount;
use cipherflow_types::{parse_address, EventBus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const PUBLISHER_CACHE_ID: &str = "publisher";
const SOLVER_TELEMETRY_ID: &str = "solver";
const EVENT_BUS_CAPACITY: usize = 1000;

/// Assembles an [`AuctionEngine`] from configuration and named factories.
pub struct AuctionBuilder {
	config: Config,
	storage_factories: HashMap<String, StorageFactory>,
	ledger_factories: HashMap<String, LedgerFactory>,
	source_factories: HashMap<String, SourceFactory>,
	connector_factories: HashMap<String, ConnectorFactory>,
	timelock_factories: HashMap<String, TimelockFactory>,
	execution_factories: HashMap<String, ExecutionFactory>,
	ledger: Option<Box<dyn LedgerInterface>>,
}

fn registry<F>(implementations: Vec<(&'static str, F)>) -> HashMap<String, F> {
	implementations
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect()
}

fn lookup<'a, F>(factories: &'a HashMap<String, F>, kind: &str, name: &str) -> Result<&'a F, EngineError> {
	factories
		.get(name)
		.ok_or_else(|| EngineError::Config(format!("Unknown {} implementation: {}", kind, name)))
}

fn empty_table() -> toml::Value {
	toml::Value::Table(Default::default())
}

impl AuctionBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage_factories: HashMap::new(),
			ledger_factories: HashMap::new(),
			source_factories: HashMap::new(),
			connector_factories: HashMap::new(),
			timelock_factories: HashMap::new(),
			execution_factories: HashMap::new(),
			ledger: None,
		}
	}

	/// Registers every implementation the workspace ships.
	pub fn with_default_implementations(mut self) -> Self {
		self.storage_factories
			.extend(registry(cipherflow_storage::get_all_implementations()));
		self.ledger_factories
			.extend(registry(cipherflow_ledger::get_all_implementations()));
		self.source_factories
			.extend(registry(cipherflow_discovery::get_all_implementations()));
		self.connector_factories
			.extend(registry(cipherflow_pricing::get_all_implementations()));
		self.timelock_factories
			.extend(registry(cipherflow_commitment::get_all_implementations()));
		self.execution_factories
			.extend(registry(cipherflow_settlement::get_all_implementations()));
		self
	}

	pub fn with_storage_factory(mut self, name: &str, factory: StorageFactory) -> Self {
		self.storage_factories.insert(name.to_string(), factory);
		self
	}

	pub fn with_ledger_factory(mut self, name: &str, factory: LedgerFactory) -> Self {
		self.ledger_factories.insert(name.to_string(), factory);
		self
	}

	pub fn with_source_factory(mut self, name: &str, factory: SourceFactory) -> Self {
		self.source_factories.insert(name.to_string(), factory);
		self
	}

	pub fn with_connector_factory(mut self, name: &str, factory: ConnectorFactory) -> Self {
		self.connector_factories.insert(name.to_string(), factory);
		self
	}

	pub fn with_timelock_factory(mut self, name: &str, factory: TimelockFactory) -> Self {
		self.timelock_factories.insert(name.to_string(), factory);
		self
	}

	pub fn with_execution_factory(mut self, name: &str, factory: ExecutionFactory) -> Self {
		self.execution_factories.insert(name.to_string(), factory);
		self
	}

	/// Uses `ledger` instead of building one from `[ledger]`.
	pub fn with_ledger(mut self, ledger: Box<dyn LedgerInterface>) -> Self {
		self.ledger = Some(ledger);
		self
	}

	pub async fn build(mut self) -> Result<AuctionEngine, EngineError> {
		let ledger_override = self.ledger.take();
		let config = &self.config;

		let storage_factory = lookup(&self.storage_factories, "storage", &config.storage.primary)?;
		let storage_backend = storage_factory(&config.storage.primary_config())
			.map_err(|e| EngineError::Config(e.to_string()))?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let ledger_backend = match ledger_override {
			Some(ledger) => ledger,
			None => {
				let factory = lookup(&self.ledger_factories, "ledger", &config.ledger.primary)?;
				factory(&config.ledger.primary_config())
					.map_err(|e| EngineError::Config(e.to_string()))?
			}
		};
		let ledger = Arc::new(LedgerService::new(ledger_backend));
		if !ledger.has_signer() {
			info!("ledger has no signer, write operations will fail");
		}

		let events = EventBus::new(EVENT_BUS_CAPACITY);
		let queue = IntentQueue::new(config.discovery.queue_capacity);

		let ingestion = if config.discovery.enabled {
			let mut names: Vec<&String> = config.discovery.sources.keys().collect();
			names.sort();
			let mut sources = Vec::with_capacity(names.len());
			for name in names {
				let factory = lookup(&self.source_factories, "intent source", name)?;
				let source = factory(&config.discovery.sources[name])
					.map_err(|e| EngineError::Config(format!("{}: {}", name, e)))?;
				sources.push(source);
			}
			debug!(sources = sources.len(), "intent sources ready");
			let service = IngestionService::new(
				sources,
				queue.clone(),
				IngestionConfig {
					poll_interval: Duration::from_secs(config.discovery.poll_interval_seconds),
					dedup_ttl: Duration::from_secs(config.discovery.dedup_ttl_seconds),
				},
			)
			.with_event_bus(events.clone());
			Some(Arc::new(service))
		} else {
			None
		};

		let publisher = if config.publisher.enabled {
			let published = DedupCache::persistent(
				storage.clone(),
				PUBLISHER_CACHE_ID,
				config.publisher.cache_ttl_seconds.map(Duration::from_secs),
			)
			.await;
			let publisher = IntentPublisher::new(ledger.clone(), published, publisher_config(config)?)
				.await
				.map_err(|e| EngineError::Service(e.to_string()))?
				.with_event_bus(events.clone());
			Some(Arc::new(publisher))
		} else {
			None
		};

		let connectors = self.connectors()?;
		let planner = Arc::new(RoutePlanner::with_gas_price_gwei(
			connectors.clone(),
			config.pricing.gas_price_gwei,
		));

		let (commitments, scanner, telemetry) = if config.solver.enabled {
			let timelock_config = config
				.timelock
				.as_ref()
				.ok_or_else(|| EngineError::Config("The solver requires a [timelock] section".into()))?;
			let factory = lookup(&self.timelock_factories, "timelock", &timelock_config.primary)?;
			let timelock =
				factory(&timelock_config.primary_config()).map_err(|e| EngineError::Config(e.to_string()))?;

			let telemetry = Arc::new(
				TelemetryLog::persistent(
					config.solver.telemetry_capacity,
					storage.clone(),
					SOLVER_TELEMETRY_ID,
				)
				.await,
			);
			let builder = CommitmentBuilder::new(
				ledger.clone(),
				planner.clone(),
				Arc::from(timelock),
				telemetry.clone(),
				commitment_settings(config)?,
			)
			.map_err(|e| EngineError::Config(e.to_string()))?
			.with_event_bus(events.clone());
			let builder = Arc::new(builder);
			let scanner = Arc::new(OpenIntentScanner::new(builder.clone()));
			(Some(builder), Some(scanner), Some(telemetry))
		} else {
			(None, None, None)
		};

		let executor = if config.executor.enabled {
			let execution_config = &config.executor.execution;
			let factory = lookup(&self.execution_factories, "execution", &execution_config.primary)?;
			let execution = factory(&execution_config.primary_config(), &connectors)
				.map_err(|e| EngineError::Config(e.to_string()))?;
			let executor = RevealExecutor::new(
				ledger.clone(),
				Arc::from(execution),
				ExecutorConfig {
					max_commitment_scan: config.executor.max_commitment_scan,
					sweep_limit: config.executor.sweep_limit,
					default_chain_id: config.executor.default_chain_id,
					gas_price_wei: planner.gas_price_wei(),
				},
			)
			.with_event_bus(events.clone());
			Some(Arc::new(executor))
		} else {
			None
		};

		info!(
			service = %config.service.id,
			network = %config.network.name,
			ingestion = ingestion.is_some(),
			publisher = publisher.is_some(),
			solver = commitments.is_some(),
			executor = executor.is_some(),
			connectors = connectors.len(),
			"auction engine assembled"
		);

		Ok(AuctionEngine {
			config: self.config,
			ledger,
			events,
			queue,
			ingestion,
			publisher,
			planner,
			commitments,
			scanner,
			executor,
			telemetry,
			stats: Arc::new(EngineStats::new()),
			token: CancellationToken::new(),
			runtime: Default::default(),
		})
	}

	/// Configured connectors in name order. No `[pricing.connectors]` entries
	/// means every registered connector with an empty table.
	fn connectors(&self) -> Result<Vec<Arc<dyn QuoteConnector>>, EngineError> {
		let configured = &self.config.pricing.connectors;
		let mut selected: Vec<(&str, toml::Value)> = if configured.is_empty() {
			self.connector_factories
				.keys()
				.map(|name| (name.as_str(), empty_table()))
				.collect()
		} else {
			configured
				.iter()
				.map(|(name, table)| (name.as_str(), table.clone()))
				.collect()
		};
		selected.sort_by(|a, b| a.0.cmp(b.0));

		let mut connectors = Vec::with_capacity(selected.len());
		for (name, table) in selected {
			let factory = lookup(&self.connector_factories, "quote connector", name)?;
			let connector: Arc<dyn QuoteConnector> = Arc::from(
				factory(&table).map_err(|e| EngineError::Config(format!("{}: {}", name, e)))?,
			);
			connectors.push(connector);
		}
		Ok(connectors)
	}
}

fn publisher_config(config: &Config) -> Result<PublisherConfig, EngineError> {
	let mut settlement_assets = Vec::with_capacity(config.network.settlement_assets.len());
	for asset in &config.network.settlement_assets {
		let address = parse_address(&asset.address).ok_or_else(|| {
			EngineError::Config(format!("Invalid address for settlement asset {}", asset.symbol))
		})?;
		settlement_assets.push(SettlementAsset {
			symbol: asset.symbol.clone(),
			address,
		});
	}

	Ok(PublisherConfig {
		commit_window_seconds: config.commit_window_seconds(),
		reveal_window_seconds: config.reveal_window_seconds(),
		execution_window_seconds: config.execution_window_seconds(),
		scan_limit: config.publisher.scan_limit,
		max_publish_attempts: config.publisher.max_publish_attempts,
		settlement_assets,
		..Default::default()
	})
}

fn commitment_settings(config: &Config) -> Result<CommitmentSettings, EngineError> {
	let solver = &config.solver;
	let collateral: U256 = parse_amount(&solver.collateral_wei)
		.map_err(|e| EngineError::Config(format!("Invalid solver.collateral_wei: {}", e)))?;

	Ok(CommitmentSettings {
		collateral,
		callback_gas_limit: solver.callback_gas_limit,
		payload_limit: solver.payload_limit_bytes,
		planning_only: solver.planning_only,
		max_intent_scan: solver.max_intent_scan,
		no_route_retry: Duration::from_secs(solver.no_route_retry_seconds),
		overrides: SwapOverrides {
			from_token: solver.from_token.clone(),
			to_token: solver.to_token.clone(),
			source_chain_id: solver.source_chain_id,
			destination_chain_id: solver.destination_chain_id,
		},
	})
}
