//! Executor role: turns revealed commitments into executions.
//!
//! The [`RevealExecutor`] learns about reveals from the ledger's
//! notifications and from periodic sweeps, rebuilds the route from the
//! decrypted payload and hands it to an [`ExecutionInterface`] backend.

use async_trait::async_trait;
use cipherflow_ledger::LedgerError;
use cipherflow_pricing::QuoteConnector;
use cipherflow_types::{ConfigSchema, ProfitReport, QuoteLeg, SwapIntentDefinition};
use std::sync::Arc;
use thiserror::Error;

pub mod executor;

pub use executor::{ExecutionSummary, ExecutorConfig, RevealExecutor};

pub mod implementations {
	pub mod simulated;
}

#[derive(Debug, Error)]
pub enum ExecutionError {
	#[error("Execution failed: {0}")]
	Failed(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),
	#[error("Execution error: {0}")]
	Execution(#[from] ExecutionError),
	#[error("Missing intent: {0}")]
	MissingIntent(String),
}

/// What a backend did with a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
	/// No connector is configured for the route's venue.
	MissingConnector,
	/// The venue's connector does not serve the leg's chain.
	UnsupportedChain,
	/// The route was prepared but nothing is configured to broadcast it.
	NotBroadcast,
	/// The route was prepared for broadcast.
	Prepared,
}

#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait ExecutionInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Carries out one revealed route. Skips are `Ok` outcomes, not errors.
	async fn execute(
		&self,
		intent: &SwapIntentDefinition,
		report: &ProfitReport,
		leg: &QuoteLeg,
	) -> Result<ExecutionOutcome, ExecutionError>;
}

/// Backends receive the configured connectors so they can look up the
/// venue a route was planned on.
pub type ExecutionFactory = fn(
	&toml::Value,
	&[Arc<dyn QuoteConnector>],
) -> Result<Box<dyn ExecutionInterface>, ExecutionError>;

pub fn get_all_implementations() -> Vec<(&'static str, ExecutionFactory)> {
	use implementations::simulated;

	vec![(simulated::Registry::NAME, simulated::Registry::factory())]
}
