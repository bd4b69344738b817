//! 1inch Fusion intent source.

use super::http::{normalize_items, HttpFetcher, HttpSourceSchema};
use crate::{IntentSourceInterface, SourceError};
use alloy::primitives::U256;
use async_trait::async_trait;
use cipherflow_types::utils::amount;
use cipherflow_types::{ConfigSchema, IntentMetadata, IntentSourceKind, NormalizedIntent};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FusionIntent {
	request_id: String,
	maker: String,
	from_token: String,
	to_token: String,
	#[serde(with = "amount")]
	amount: U256,
	#[serde(with = "amount")]
	min_return_amount: U256,
	#[serde(default)]
	metadata: Option<IntentMetadata>,
}

impl From<FusionIntent> for NormalizedIntent {
	fn from(intent: FusionIntent) -> Self {
		NormalizedIntent {
			external_id: intent.request_id,
			trader: intent.maker,
			from_token: intent.from_token,
			to_token: intent.to_token,
			amount_in: intent.amount,
			min_amount_out: intent.min_return_amount,
			source: IntentSourceKind::OneInch,
			metadata: intent.metadata.unwrap_or_default(),
		}
	}
}

pub struct OneInchSource {
	fetcher: HttpFetcher,
}

#[async_trait]
impl IntentSourceInterface for OneInchSource {
	fn kind(&self) -> IntentSourceKind {
		IntentSourceKind::OneInch
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpSourceSchema)
	}

	async fn pull_intents(&self) -> Result<Vec<NormalizedIntent>, SourceError> {
		let items = self.fetcher.fetch_items().await?;
		Ok(normalize_items(IntentSourceKind::OneInch, items, |item| {
			serde_json::from_value::<FusionIntent>(item)
				.map(NormalizedIntent::from)
				.map_err(|e| e.to_string())
		}))
	}
}

pub fn create_source(config: &toml::Value) -> Result<Box<dyn IntentSourceInterface>, SourceError> {
	Ok(Box::new(OneInchSource {
		fetcher: HttpFetcher::from_config(config, "intents")?,
	}))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "oneinch";

	pub fn factory() -> crate::SourceFactory {
		create_source
	}
}
