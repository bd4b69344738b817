//! Configuration loading for the cipherflow service.
//!
//! A single TOML file is read, `${VAR}` and `${VAR:-default}` references are
//! resolved from the environment, `CIPHERFLOW_*` overrides are applied on
//! top and the result is validated before anything is built from it.

mod types;

pub use types::*;

use cipherflow_types::{parse_address, utils::parse_amount};
use regex::Regex;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "config/local.toml";
pub const DEFAULT_ENV_PREFIX: &str = "CIPHERFLOW_";

/// Backend the RPC, key and hub overrides are written into.
const EVM_LEDGER: &str = "evm";

const FALLBACK_COMMIT_WINDOW_SECONDS: u64 = 3_600;
const FALLBACK_REVEAL_WINDOW_SECONDS: u64 = 60;
const FALLBACK_EXECUTION_WINDOW_SECONDS: u64 = 3_600;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	Parse(String),

	#[error("Validation error: {0}")]
	Validation(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Replaces `${VAR}` with the variable's value and `${VAR:-default}` with
/// the value or `default` when unset.
pub fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let Some(full_match) = cap.get(0) else {
			continue;
		};
		let var_name = &cap[1];
		let value = match env::var(var_name) {
			Ok(value) => value,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
			},
		};
		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: DEFAULT_ENV_PREFIX.to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		if !tokio::fs::try_exists(path).await.unwrap_or(false) {
			return Err(ConfigError::FileNotFound(path.display().to_string()));
		}

		debug!(path = %path.display(), "loading configuration");
		let content = tokio::fs::read_to_string(path).await?;
		self.load_str(&content)
	}

	/// Same pipeline as [`load`](Self::load) for in-memory TOML.
	pub fn load_str(&self, content: &str) -> Result<Config, ConfigError> {
		let substituted = resolve_env_vars(content)?;
		let mut config: Config = toml::from_str(&substituted)?;
		self.apply_env_overrides(&mut config)?;
		config.validate()?;
		Ok(config)
	}

	fn env(&self, name: &str) -> Option<String> {
		env::var(format!("{}{}", self.env_prefix, name))
			.ok()
			.filter(|v| !v.is_empty())
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Some(log_level) = self.env("LOG_LEVEL") {
			config.service.log_level = log_level;
		}

		if let Some(http_port) = self.env("HTTP_PORT") {
			config.service.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::Validation(format!("Invalid HTTP port: {}", e)))?;
		}

		// Ledger overrides only target an evm backend the file selects or declares.
		let targets_evm = config.ledger.primary == EVM_LEDGER
			|| config.ledger.implementations.contains_key(EVM_LEDGER);
		for (name, key) in [
			("RPC_URL", "rpc_url"),
			("PRIVATE_KEY", "private_key"),
			("INTENT_HUB_ADDRESS", "intent_hub_address"),
		] {
			if let Some(value) = self.env(name) {
				if !targets_evm {
					debug!(key, "ignoring ledger override, evm backend not configured");
					continue;
				}
				debug!(key, "overriding ledger setting from environment");
				let entry = config
					.ledger
					.implementations
					.entry(EVM_LEDGER.to_string())
					.or_insert_with(|| toml::Value::Table(Default::default()));
				if let Some(table) = entry.as_table_mut() {
					table.insert(key.to_string(), toml::Value::String(value));
				}
			}
		}

		Ok(())
	}
}

impl Config {
	pub fn commit_window_seconds(&self) -> u64 {
		self.publisher
			.commit_window_seconds
			.or(self.network.default_commit_window_seconds)
			.unwrap_or(FALLBACK_COMMIT_WINDOW_SECONDS)
	}

	pub fn reveal_window_seconds(&self) -> u64 {
		self.publisher.reveal_window_seconds.unwrap_or_else(|| {
			match self.network.default_reveal_delay_blocks {
				Some(blocks) if blocks > 0 => blocks * self.network.block_time_seconds,
				_ => FALLBACK_REVEAL_WINDOW_SECONDS,
			}
		})
	}

	pub fn execution_window_seconds(&self) -> u64 {
		self.publisher
			.execution_window_seconds
			.or(self.network.default_execution_window_seconds)
			.unwrap_or(FALLBACK_EXECUTION_WINDOW_SECONDS)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.network.chain_id == 0 {
			return Err(ConfigError::Validation("network.chain_id must be positive".into()));
		}
		if self.network.block_time_seconds == 0 {
			return Err(ConfigError::Validation(
				"network.block_time_seconds must be positive".into(),
			));
		}
		for asset in &self.network.settlement_assets {
			if asset.symbol.trim().is_empty() {
				return Err(ConfigError::Validation(
					"Settlement asset symbol cannot be empty".into(),
				));
			}
			if parse_address(&asset.address).is_none() {
				return Err(ConfigError::Validation(format!(
					"Settlement asset '{}' has an invalid address",
					asset.symbol
				)));
			}
		}

		validate_backend("storage", &self.storage)?;
		validate_backend("ledger", &self.ledger)?;

		if self.discovery.enabled && self.discovery.poll_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"discovery.poll_interval_seconds must be positive".into(),
			));
		}

		if self.publisher.enabled {
			if self.publisher.max_publish_attempts == 0 {
				return Err(ConfigError::Validation(
					"publisher.max_publish_attempts must be at least 1".into(),
				));
			}
			if self.publisher.scan_limit == 0 || self.publisher.retry_interval_seconds == 0 {
				return Err(ConfigError::Validation(
					"publisher.scan_limit and retry_interval_seconds must be positive".into(),
				));
			}
			if self.reveal_window_seconds() == 0 || self.execution_window_seconds() == 0 {
				return Err(ConfigError::Validation(
					"Reveal and execution windows must be positive".into(),
				));
			}
		}

		if self.pricing.gas_price_gwei == 0 {
			return Err(ConfigError::Validation("pricing.gas_price_gwei must be positive".into()));
		}

		if self.solver.enabled {
			let timelock = self.timelock.as_ref().ok_or_else(|| {
				ConfigError::Validation("[timelock] is required when the solver is enabled".into())
			})?;
			validate_backend("timelock", timelock)?;

			let collateral = parse_amount(&self.solver.collateral_wei).map_err(|e| {
				ConfigError::Validation(format!("Invalid solver.collateral_wei: {}", e))
			})?;
			if collateral.is_zero() {
				return Err(ConfigError::Validation(
					"solver.collateral_wei must be positive".into(),
				));
			}
			if self.solver.scan_interval_seconds == 0 || self.solver.payload_limit_bytes == 0 {
				return Err(ConfigError::Validation(
					"solver.scan_interval_seconds and payload_limit_bytes must be positive".into(),
				));
			}
		}

		if self.executor.enabled {
			validate_backend("executor.execution", &self.executor.execution)?;
			if self.executor.sweep_interval_seconds == 0
				|| self.executor.sweep_limit == 0
				|| self.executor.max_commitment_scan == 0
			{
				return Err(ConfigError::Validation(
					"executor sweep settings must be positive".into(),
				));
			}
		}

		Ok(())
	}
}

/// `primary` must be set, and must name one of `implementations` when any
/// are listed.
fn validate_backend(section: &str, backend: &BackendConfig) -> Result<(), ConfigError> {
	if backend.primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !backend.implementations.is_empty() && !backend.implementations.contains_key(&backend.primary)
	{
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, backend.primary
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[storage]
primary = "memory"

[ledger]
primary = "memory"
"#;

	fn loader(prefix: &str) -> ConfigLoader {
		ConfigLoader::new().with_env_prefix(prefix)
	}

	#[test]
	fn test_env_var_resolution() {
		env::set_var("CIPHERFLOW_TEST_RPC", "http://localhost:8545");
		let resolved = resolve_env_vars("rpc_url = \"${CIPHERFLOW_TEST_RPC}\"").unwrap();
		assert_eq!(resolved, "rpc_url = \"http://localhost:8545\"");
	}

	#[test]
	fn test_env_var_with_default() {
		let resolved =
			resolve_env_vars("port = ${CIPHERFLOW_TEST_UNSET_PORT:-9000} # ${CIPHERFLOW_TEST_UNSET_B:-}")
				.unwrap();
		assert_eq!(resolved, "port = 9000 # ");
	}

	#[test]
	fn test_missing_env_var_error() {
		let result = resolve_env_vars("key = \"${CIPHERFLOW_TEST_DEFINITELY_MISSING}\"");
		assert!(matches!(result, Err(ConfigError::EnvVarNotFound(name)) if name == "CIPHERFLOW_TEST_DEFINITELY_MISSING"));
	}

	#[test]
	fn test_minimal_config_uses_defaults() {
		let config = loader("CFTEST_DEFAULTS_").load_str(MINIMAL).unwrap();
		assert_eq!(config.service.http_port, 8080);
		assert_eq!(config.discovery.poll_interval_seconds, 15);
		assert_eq!(config.discovery.dedup_ttl_seconds, 300);
		assert_eq!(config.publisher.scan_limit, 50);
		assert_eq!(config.pricing.gas_price_gwei, 25);
		assert_eq!(config.solver.callback_gas_limit, 300_000);
		assert_eq!(config.solver.telemetry_capacity, 50);
		assert_eq!(config.executor.sweep_interval_seconds, 20);
		assert_eq!(config.executor.default_chain_id, 84532);
		assert_eq!(config.executor.execution.primary, "simulated");
		assert_eq!(config.commit_window_seconds(), 3_600);
		assert_eq!(config.reveal_window_seconds(), 60);
		assert_eq!(config.execution_window_seconds(), 3_600);
	}

	#[test]
	fn test_reveal_window_from_blocks_and_overrides() {
		let toml = format!(
			"{}\n[network]\nblock_time_seconds = 2\ndefault_reveal_delay_blocks = 15\ndefault_commit_window_seconds = 600\n",
			MINIMAL
		);
		let config = loader("CFTEST_WINDOWS_").load_str(&toml).unwrap();
		assert_eq!(config.reveal_window_seconds(), 30);
		assert_eq!(config.commit_window_seconds(), 600);

		let toml = format!("{}\n[publisher]\nreveal_window_seconds = 90\n", MINIMAL);
		let config = loader("CFTEST_WINDOWS_").load_str(&toml).unwrap();
		assert_eq!(config.reveal_window_seconds(), 90);
	}

	#[test]
	fn test_env_overrides_reach_evm_ledger() {
		env::set_var("CFTEST_OVERRIDES_HTTP_PORT", "9100");
		env::set_var("CFTEST_OVERRIDES_RPC_URL", "https://sepolia.base.org");
		env::set_var("CFTEST_OVERRIDES_LOG_LEVEL", "debug");

		let toml = "[storage]\nprimary = \"memory\"\n\n[ledger]\nprimary = \"evm\"\n";
		let config = loader("CFTEST_OVERRIDES_").load_str(toml).unwrap();
		assert_eq!(config.service.http_port, 9100);
		assert_eq!(config.service.log_level, "debug");
		assert_eq!(
			config.ledger.implementations[EVM_LEDGER].get("rpc_url").and_then(|v| v.as_str()),
			Some("https://sepolia.base.org")
		);
	}

	#[test]
	fn test_ledger_overrides_ignored_for_memory_ledger() {
		env::set_var("CFTEST_MEMLEDGER_RPC_URL", "https://sepolia.base.org");
		env::set_var("CFTEST_MEMLEDGER_PRIVATE_KEY", "0x01");

		let config = loader("CFTEST_MEMLEDGER_").load_str(MINIMAL).unwrap();
		assert_eq!(config.ledger.primary, "memory");
		assert!(!config.ledger.implementations.contains_key(EVM_LEDGER));
	}

	#[test]
	fn test_ledger_overrides_merge_into_declared_evm_table() {
		env::set_var("CFTEST_DECLARED_INTENT_HUB_ADDRESS", "0x00000000000000000000000000000000000000b1");

		let toml = format!(
			"{}\n[ledger.implementations.memory]\n\n[ledger.implementations.evm]\nrpc_url = \"http://localhost:8545\"\n",
			MINIMAL
		);
		let config = loader("CFTEST_DECLARED_").load_str(&toml).unwrap();
		let evm = &config.ledger.implementations[EVM_LEDGER];
		assert_eq!(evm.get("rpc_url").and_then(|v| v.as_str()), Some("http://localhost:8545"));
		assert_eq!(
			evm.get("intent_hub_address").and_then(|v| v.as_str()),
			Some("0x00000000000000000000000000000000000000b1")
		);
	}

	#[test]
	fn test_invalid_http_port_override() {
		env::set_var("CFTEST_BADPORT_HTTP_PORT", "not-a-port");
		assert!(matches!(
			loader("CFTEST_BADPORT_").load_str(MINIMAL),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_primary_must_be_listed() {
		let toml = r#"
[storage]
primary = "file"
[storage.implementations.memory]

[ledger]
primary = "memory"
"#;
		let err = loader("CFTEST_PRIMARY_").load_str(toml).unwrap_err();
		assert!(err.to_string().contains("Primary storage 'file'"));
	}

	#[test]
	fn test_solver_requires_timelock_and_collateral() {
		let toml = format!("{}\n[solver]\nenabled = true\ncollateral_wei = \"0\"\n", MINIMAL);
		let err = loader("CFTEST_SOLVER_").load_str(&toml).unwrap_err();
		assert!(err.to_string().contains("[timelock]"));

		let toml = format!(
			"{}\n[timelock]\nprimary = \"mock\"\n\n[solver]\nenabled = true\ncollateral_wei = \"0\"\n",
			MINIMAL
		);
		let err = loader("CFTEST_SOLVER_").load_str(&toml).unwrap_err();
		assert!(err.to_string().contains("collateral_wei must be positive"));

		let toml = format!(
			"{}\n[timelock]\nprimary = \"mock\"\n\n[solver]\nenabled = true\ncollateral_wei = \"10000000000000000\"\n",
			MINIMAL
		);
		assert!(loader("CFTEST_SOLVER_").load_str(&toml).is_ok());
	}

	#[test]
	fn test_invalid_settlement_asset_address() {
		let toml = format!(
			"{}\n[[network.settlement_assets]]\nsymbol = \"USDC\"\naddress = \"0x1234\"\n",
			MINIMAL
		);
		assert!(matches!(
			loader("CFTEST_ASSETS_").load_str(&toml),
			Err(ConfigError::Validation(_))
		));
	}

	#[tokio::test]
	async fn test_load_from_file() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("local.toml");
		std::fs::write(&path, MINIMAL).unwrap();

		let config = loader("CFTEST_FILE_").with_file(&path).load().await.unwrap();
		assert_eq!(config.storage.primary, "memory");

		let missing = loader("CFTEST_FILE_")
			.with_file(dir.path().join("absent.toml"))
			.load()
			.await;
		assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));
	}
}
