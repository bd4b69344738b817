//! Configuration sections.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Complete process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	#[serde(default)]
	pub service: ServiceConfig,
	#[serde(default)]
	pub network: NetworkConfig,
	pub storage: BackendConfig,
	pub ledger: BackendConfig,
	#[serde(default)]
	pub discovery: DiscoveryConfig,
	#[serde(default)]
	pub publisher: PublisherSettings,
	#[serde(default)]
	pub pricing: PricingConfig,
	/// Required when the solver role is enabled.
	#[serde(default)]
	pub timelock: Option<BackendConfig>,
	#[serde(default)]
	pub solver: SolverSettings,
	#[serde(default)]
	pub executor: ExecutorSettings,
}

/// A pluggable seam: which implementation to use and each one's table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
	pub primary: String,
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

impl BackendConfig {
	/// Table of the primary implementation, or an empty table.
	pub fn primary_config(&self) -> toml::Value {
		self.implementations
			.get(&self.primary)
			.cloned()
			.unwrap_or_else(|| toml::Value::Table(Default::default()))
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	#[serde(default = "default_service_id")]
	pub id: String,
	#[serde(default = "default_http_port")]
	pub http_port: u16,
	#[serde(default = "default_true")]
	pub api_enabled: bool,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			id: default_service_id(),
			http_port: default_http_port(),
			api_enabled: true,
			log_level: default_log_level(),
		}
	}
}

fn default_service_id() -> String {
	"cipherflow".to_string()
}

fn default_http_port() -> u16 {
	8080
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_true() -> bool {
	true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	#[serde(default = "default_network_name")]
	pub name: String,
	#[serde(default = "default_chain_id")]
	pub chain_id: u64,
	#[serde(default = "default_block_time_seconds")]
	pub block_time_seconds: u64,
	pub default_commit_window_seconds: Option<u64>,
	/// Reveal window in blocks; converted with `block_time_seconds`.
	pub default_reveal_delay_blocks: Option<u64>,
	pub default_execution_window_seconds: Option<u64>,
	#[serde(default)]
	pub settlement_assets: Vec<SettlementAssetConfig>,
}

impl Default for NetworkConfig {
	fn default() -> Self {
		Self {
			name: default_network_name(),
			chain_id: default_chain_id(),
			block_time_seconds: default_block_time_seconds(),
			default_commit_window_seconds: None,
			default_reveal_delay_blocks: None,
			default_execution_window_seconds: None,
			settlement_assets: Vec::new(),
		}
	}
}

fn default_network_name() -> String {
	"base-sepolia".to_string()
}

fn default_chain_id() -> u64 {
	cipherflow_types::DEFAULT_CHAIN_ID
}

fn default_block_time_seconds() -> u64 {
	2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettlementAssetConfig {
	pub symbol: String,
	pub address: String,
	#[serde(default = "default_decimals")]
	pub decimals: u8,
}

fn default_decimals() -> u8 {
	18
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_poll_interval_seconds")]
	pub poll_interval_seconds: u64,
	#[serde(default = "default_dedup_ttl_seconds")]
	pub dedup_ttl_seconds: u64,
	#[serde(default = "default_queue_capacity")]
	pub queue_capacity: usize,
	/// Source name to its table (`endpoint`, `timeout_seconds`).
	#[serde(default)]
	pub sources: HashMap<String, toml::Value>,
}

impl Default for DiscoveryConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			poll_interval_seconds: default_poll_interval_seconds(),
			dedup_ttl_seconds: default_dedup_ttl_seconds(),
			queue_capacity: default_queue_capacity(),
			sources: HashMap::new(),
		}
	}
}

fn default_poll_interval_seconds() -> u64 {
	15
}

fn default_dedup_ttl_seconds() -> u64 {
	300
}

fn default_queue_capacity() -> usize {
	1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublisherSettings {
	#[serde(default = "default_true")]
	pub enabled: bool,
	pub commit_window_seconds: Option<u64>,
	pub reveal_window_seconds: Option<u64>,
	pub execution_window_seconds: Option<u64>,
	#[serde(default = "default_scan_limit")]
	pub scan_limit: u64,
	/// Entries of the published-intent cache expire after this long. Unset
	/// keeps them for the lifetime of the storage.
	pub cache_ttl_seconds: Option<u64>,
	#[serde(default = "default_max_publish_attempts")]
	pub max_publish_attempts: u32,
	#[serde(default = "default_retry_interval_seconds")]
	pub retry_interval_seconds: u64,
}

impl Default for PublisherSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			commit_window_seconds: None,
			reveal_window_seconds: None,
			execution_window_seconds: None,
			scan_limit: default_scan_limit(),
			cache_ttl_seconds: None,
			max_publish_attempts: default_max_publish_attempts(),
			retry_interval_seconds: default_retry_interval_seconds(),
		}
	}
}

fn default_scan_limit() -> u64 {
	50
}

fn default_max_publish_attempts() -> u32 {
	3
}

fn default_retry_interval_seconds() -> u64 {
	30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricingConfig {
	#[serde(default = "default_gas_price_gwei")]
	pub gas_price_gwei: u64,
	/// Connector name to its table. Empty enables every connector with
	/// default settings.
	#[serde(default)]
	pub connectors: HashMap<String, toml::Value>,
}

impl Default for PricingConfig {
	fn default() -> Self {
		Self {
			gas_price_gwei: default_gas_price_gwei(),
			connectors: HashMap::new(),
		}
	}
}

fn default_gas_price_gwei() -> u64 {
	25
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolverSettings {
	#[serde(default)]
	pub enabled: bool,
	/// Decimal wei string posted with every commitment.
	#[serde(default)]
	pub collateral_wei: String,
	#[serde(default = "default_callback_gas_limit")]
	pub callback_gas_limit: u32,
	#[serde(default = "default_scan_interval_seconds")]
	pub scan_interval_seconds: u64,
	#[serde(default = "default_max_intent_scan")]
	pub max_intent_scan: u64,
	/// Delay before the scan retries an intent that found no route.
	#[serde(default = "default_no_route_retry_seconds")]
	pub no_route_retry_seconds: u64,
	pub target_intent_id: Option<u64>,
	#[serde(default)]
	pub planning_only: bool,
	#[serde(default = "default_telemetry_capacity")]
	pub telemetry_capacity: usize,
	#[serde(default = "default_payload_limit_bytes")]
	pub payload_limit_bytes: usize,
	pub from_token: Option<String>,
	pub to_token: Option<String>,
	pub source_chain_id: Option<u64>,
	pub destination_chain_id: Option<u64>,
}

impl Default for SolverSettings {
	fn default() -> Self {
		Self {
			enabled: false,
			collateral_wei: String::new(),
			callback_gas_limit: default_callback_gas_limit(),
			scan_interval_seconds: default_scan_interval_seconds(),
			max_intent_scan: default_max_intent_scan(),
			no_route_retry_seconds: default_no_route_retry_seconds(),
			target_intent_id: None,
			planning_only: false,
			telemetry_capacity: default_telemetry_capacity(),
			payload_limit_bytes: default_payload_limit_bytes(),
			from_token: None,
			to_token: None,
			source_chain_id: None,
			destination_chain_id: None,
		}
	}
}

fn default_callback_gas_limit() -> u32 {
	300_000
}

fn default_scan_interval_seconds() -> u64 {
	30
}

fn default_max_intent_scan() -> u64 {
	25
}

fn default_no_route_retry_seconds() -> u64 {
	300
}

fn default_telemetry_capacity() -> usize {
	50
}

fn default_payload_limit_bytes() -> usize {
	256
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorSettings {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_sweep_interval_seconds")]
	pub sweep_interval_seconds: u64,
	#[serde(default = "default_max_commitment_scan")]
	pub max_commitment_scan: u64,
	#[serde(default = "default_sweep_limit")]
	pub sweep_limit: usize,
	#[serde(default = "default_chain_id")]
	pub default_chain_id: u64,
	#[serde(default = "default_execution")]
	pub execution: BackendConfig,
}

impl Default for ExecutorSettings {
	fn default() -> Self {
		Self {
			enabled: false,
			sweep_interval_seconds: default_sweep_interval_seconds(),
			max_commitment_scan: default_max_commitment_scan(),
			sweep_limit: default_sweep_limit(),
			default_chain_id: default_chain_id(),
			execution: default_execution(),
		}
	}
}

fn default_sweep_interval_seconds() -> u64 {
	20
}

fn default_max_commitment_scan() -> u64 {
	25
}

fn default_sweep_limit() -> usize {
	20
}

fn default_execution() -> BackendConfig {
	BackendConfig {
		primary: "simulated".to_string(),
		implementations: HashMap::new(),
	}
}
