//! Quote connectors and route planning for the solver role.
//!
//! A [`QuoteConnector`] answers one swap request for one venue. The
//! [`RoutePlanner`] asks every connector concurrently and keeps the route
//! with the best net output.

use async_trait::async_trait;
use cipherflow_types::{ChainId, ConfigSchema, QuoteRequest, QuoteResult, Venue};
use thiserror::Error;

pub mod planner;

pub use planner::RoutePlanner;

pub mod implementations {
	pub(crate) mod api;

	pub mod aerodrome;
	pub mod curve;
	pub mod mock_bridge;
	pub mod uniswap;
}

#[derive(Debug, Error)]
pub enum ConnectorError {
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("HTTP error: {0}")]
	Http(String),
	#[error("Parse error: {0}")]
	Parse(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<cipherflow_types::InvalidQuoteRequest> for ConnectorError {
	fn from(err: cipherflow_types::InvalidQuoteRequest) -> Self {
		ConnectorError::InvalidRequest(err.0)
	}
}

/// Price source for a single venue.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait QuoteConnector: Send + Sync {
	fn venue(&self) -> Venue;

	fn supported_chains(&self) -> Vec<ChainId>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// `Ok(None)` when the venue has nothing for this chain. An invalid
	/// request is an error.
	async fn get_quote(&self, request: &QuoteRequest) -> Result<Option<QuoteResult>, ConnectorError>;
}

pub type ConnectorFactory = fn(&toml::Value) -> Result<Box<dyn QuoteConnector>, ConnectorError>;

pub fn get_all_implementations() -> Vec<(&'static str, ConnectorFactory)> {
	use implementations::{aerodrome, curve, mock_bridge, uniswap};

	vec![
		(aerodrome::Registry::NAME, aerodrome::Registry::factory()),
		(uniswap::Registry::NAME, uniswap::Registry::factory()),
		(curve::Registry::NAME, curve::Registry::factory()),
		(mock_bridge::Registry::NAME, mock_bridge::Registry::factory()),
	]
}
