//! CoW Protocol order book source.

use super::http::{normalize_items, HttpFetcher, HttpSourceSchema};
use crate::{IntentSourceInterface, SourceError};
use alloy::primitives::U256;
use async_trait::async_trait;
use cipherflow_types::utils::amount;
use cipherflow_types::{ConfigSchema, IntentMetadata, IntentSourceKind, NormalizedIntent};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CowOrder {
	uid: String,
	owner: String,
	sell_token: String,
	buy_token: String,
	#[serde(with = "amount")]
	sell_amount: U256,
	#[serde(with = "amount")]
	buy_amount: U256,
	#[serde(default)]
	valid_to: Option<u64>,
	#[serde(default)]
	app_data: Option<String>,
}

impl From<CowOrder> for NormalizedIntent {
	fn from(order: CowOrder) -> Self {
		NormalizedIntent {
			external_id: order.uid,
			trader: order.owner,
			from_token: order.sell_token,
			to_token: order.buy_token,
			amount_in: order.sell_amount,
			min_amount_out: order.buy_amount,
			source: IntentSourceKind::Cow,
			metadata: IntentMetadata {
				valid_to: order.valid_to,
				app_data: order.app_data,
				..Default::default()
			},
		}
	}
}

pub struct CowSource {
	fetcher: HttpFetcher,
}

#[async_trait]
impl IntentSourceInterface for CowSource {
	fn kind(&self) -> IntentSourceKind {
		IntentSourceKind::Cow
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpSourceSchema)
	}

	async fn pull_intents(&self) -> Result<Vec<NormalizedIntent>, SourceError> {
		let items = self.fetcher.fetch_items().await?;
		Ok(normalize_items(IntentSourceKind::Cow, items, |item| {
			serde_json::from_value::<CowOrder>(item)
				.map(NormalizedIntent::from)
				.map_err(|e| e.to_string())
		}))
	}
}

/// - `endpoint` (optional): order list URL; without it the source is idle
/// - `timeout_seconds` (optional, default 10)
pub fn create_source(config: &toml::Value) -> Result<Box<dyn IntentSourceInterface>, SourceError> {
	Ok(Box::new(CowSource {
		fetcher: HttpFetcher::from_config(config, "orders")?,
	}))
}

pub struct Registry;

impl Registry {
	pub const NAME: &'static str = "cow";

	pub fn factory() -> crate::SourceFactory {
		create_source
	}
}
