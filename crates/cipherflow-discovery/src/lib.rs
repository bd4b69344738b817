//! Intent discovery for the listener role.
//!
//! Intent sources pull candidate trades from external origins and normalize
//! them. The [`IngestionService`] polls every source, drops keys it has
//! already forwarded and hands the rest to the [`IntentQueue`].

use async_trait::async_trait;
use cipherflow_types::{ConfigSchema, IntentSourceKind, NormalizedIntent};
use thiserror::Error;

pub mod ingestion;
pub mod queue;

pub use ingestion::{IngestionConfig, IngestionService};
pub use queue::{IntentQueue, Subscription};

pub mod implementations {
	pub(crate) mod http;

	pub mod cow;
	pub mod manual;
	pub mod oneinch;
}

#[derive(Debug, Error)]
pub enum SourceError {
	#[error("HTTP error: {0}")]
	Http(String),
	#[error("Unexpected status: {0}")]
	Status(String),
	#[error("Parse error: {0}")]
	Parse(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// One external origin of intents.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait IntentSourceInterface: Send + Sync {
	fn kind(&self) -> IntentSourceKind;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Fetches the current batch. Items that fail validation are dropped
	/// before this returns; an error means the whole fetch failed.
	async fn pull_intents(&self) -> Result<Vec<NormalizedIntent>, SourceError>;
}

pub type SourceFactory = fn(&toml::Value) -> Result<Box<dyn IntentSourceInterface>, SourceError>;

pub fn get_all_implementations() -> Vec<(&'static str, SourceFactory)> {
	use implementations::{cow, manual, oneinch};

	vec![
		(manual::Registry::NAME, manual::Registry::factory()),
		(cow::Registry::NAME, cow::Registry::factory()),
		(oneinch::Registry::NAME, oneinch::Registry::factory()),
	]
}
