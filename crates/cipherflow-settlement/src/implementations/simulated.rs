//! Execution backend that prepares routes without broadcasting them.
//!
//! The venue's connector has to exist and serve the leg's chain. With an
//! `rpc_url` configured the prepared call is logged as the payload that
//! would be sent; without one the broadcast step is skipped.

use crate::{ExecutionError, ExecutionInterface, ExecutionOutcome};
use async_trait::async_trait;
use cipherflow_pricing::QuoteConnector;
use cipherflow_types::{
	ConfigSchema, Field, FieldType, ProfitReport, QuoteLeg, Schema, SwapIntentDefinition,
	ValidationError, Venue,
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct SimulatedExecutionSchema;

impl ConfigSchema for SimulatedExecutionSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("rpc_url", FieldType::Url)]).validate(config)
	}
}

pub struct SimulatedExecution {
	connectors: Vec<Arc<dyn QuoteConnector>>,
	rpc_url: Option<String>,
}

impl SimulatedExecution {
	pub fn new(connectors: Vec<Arc<dyn QuoteConnector>>, rpc_url: Option<String>) -> Self {
		Self {
			connectors,
			rpc_url,
		}
	}

	fn connector_for(&self, venue: Venue) -> Option<&Arc<dyn QuoteConnector>> {
		self.connectors.iter().find(|c| c.venue() == venue)
	}
}

#[async_trait]
impl ExecutionInterface for SimulatedExecution {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedExecutionSchema)
	}

	async fn execute(
		&self,
		intent: &SwapIntentDefinition,
		report: &ProfitReport,
		leg: &QuoteLeg,
	) -> Result<ExecutionOutcome, ExecutionError> {
		info!(
			intent_id = intent.intent_id,
			commitment_id = ?intent.commitment_id,
			venue = %report.venue,
			amount_out = %report.amount_out,
			net_profit = %report.net_profit,
			"preparing execution"
		);

		let Some(connector) = self.connector_for(leg.venue) else {
			warn!(venue = %leg.venue, "no connector configured for venue");
			return Ok(ExecutionOutcome::MissingConnector);
		};
		if !connector.supported_chains().contains(&leg.chain_id) {
			warn!(venue = %leg.venue, chain_id = leg.chain_id, "venue does not serve chain");
			return Ok(ExecutionOutcome::UnsupportedChain);
		}

		let Some(rpc_url) = &self.rpc_url else {
			info!(chain_id = leg.chain_id, "no execution RPC configured, skipping broadcast");
			return Ok(ExecutionOutcome::NotBroadcast);
		};

		info!(
			rpc_url = %rpc_url,
			target = %leg.target,
			call_data = %leg.call_data,
			chain_id = leg.chain_id,
			"prepared execution payload"
		);
		Ok(ExecutionOutcome::Prepared)
	}
}

/// Builds a [`SimulatedExecution`].
///
/// - `rpc_url` (optional): endpoint routes would be broadcast to
pub fn create_execution(
	config: &toml::Value,
	connectors: &[Arc<dyn QuoteConnector>],
) -> Result<Box<dyn ExecutionInterface>, ExecutionError> {
	SimulatedExecutionSchema
		.validate(config)
		.map_err(|e| ExecutionError::Configuration(format!("Invalid configuration: {}", e)))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.map(str::to_string);

	Ok(Box::new(SimulatedExecution::new(connectors.to_vec(), rpc_url)))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "simulated";

	pub fn factory() -> crate::ExecutionFactory {
		create_execution
	}
}
