//! Queue listener that turns normalized intents into ledger registrations.

use crate::retry::{PendingPublish, RetryQueue, DEFAULT_RETRY_CAPACITY};
use crate::PublisherError;
use alloy::primitives::{Address, TxHash, U256};
use cipherflow_discovery::{IntentQueue, Subscription};
use cipherflow_ledger::{LedgerError, LedgerService};
use cipherflow_storage::DedupCache;
use cipherflow_types::{
	current_timestamp, current_timestamp_millis, parse_address, truncate_id, AuctionEvent,
	CreateIntentParams, EventBus, IntentExtraData, NormalizedIntent, PublisherEvent,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_COMMIT_WINDOW_SECONDS: u64 = 3600;
pub const DEFAULT_REVEAL_WINDOW_SECONDS: u64 = 60;
pub const DEFAULT_EXECUTION_WINDOW_SECONDS: u64 = 3600;
pub const DEFAULT_SCAN_LIMIT: u64 = 50;
pub const DEFAULT_MAX_PUBLISH_ATTEMPTS: u32 = 3;

/// ERC-20 the ledger settles in, addressed by symbol in source feeds.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementAsset {
	pub symbol: String,
	pub address: Address,
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
	pub commit_window_seconds: u64,
	pub reveal_window_seconds: u64,
	pub execution_window_seconds: u64,
	/// How many of the most recent ledger intents are checked for an
	/// existing registration.
	pub scan_limit: u64,
	/// Total attempts per intent, the first one included.
	pub max_publish_attempts: u32,
	pub retry_capacity: usize,
	pub settlement_assets: Vec<SettlementAsset>,
}

impl Default for PublisherConfig {
	fn default() -> Self {
		Self {
			commit_window_seconds: DEFAULT_COMMIT_WINDOW_SECONDS,
			reveal_window_seconds: DEFAULT_REVEAL_WINDOW_SECONDS,
			execution_window_seconds: DEFAULT_EXECUTION_WINDOW_SECONDS,
			scan_limit: DEFAULT_SCAN_LIMIT,
			max_publish_attempts: DEFAULT_MAX_PUBLISH_ATTEMPTS,
			retry_capacity: DEFAULT_RETRY_CAPACITY,
			settlement_assets: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
	/// Key already in the publish cache.
	Duplicate,
	/// The ledger already carries this external id.
	AlreadyRegistered(u64),
	Published(TxHash),
}

pub struct IntentPublisher {
	ledger: Arc<LedgerService>,
	published: DedupCache,
	config: PublisherConfig,
	escrow: Address,
	retries: RetryQueue,
	/// Serializes the worker and the retry job.
	publishing: Mutex<()>,
	events: Option<EventBus>,
}

impl IntentPublisher {
	/// Reads the settlement escrow once; allowance checks target it.
	pub async fn new(
		ledger: Arc<LedgerService>,
		published: DedupCache,
		config: PublisherConfig,
	) -> Result<Self, PublisherError> {
		let escrow = ledger.settlement_escrow().await?;
		debug!(%escrow, cached = published.len(), "publisher ready");
		Ok(Self {
			ledger,
			published,
			retries: RetryQueue::new(config.retry_capacity),
			config,
			escrow,
			publishing: Mutex::new(()),
			events: None,
		})
	}

	pub fn with_event_bus(mut self, events: EventBus) -> Self {
		self.events = Some(events);
		self
	}

	pub fn pending_retries(&self) -> usize {
		self.retries.len()
	}

	pub fn published_count(&self) -> usize {
		self.published.len()
	}

	/// Subscribes to `queue` and publishes each intent on a background
	/// worker, in arrival order, until `shutdown` fires.
	pub fn attach(self: &Arc<Self>, queue: &IntentQueue, shutdown: &CancellationToken) -> Subscription {
		let (sender, mut receiver) = mpsc::unbounded_channel::<NormalizedIntent>();
		let subscription = queue.on_intent(move |intent| {
			if sender.send(intent.clone()).is_err() {
				debug!(dedup_key = %intent.dedup_key(), "publisher stopped, intent not handed off");
			}
		});

		let publisher = Arc::clone(self);
		let token = shutdown.child_token();
		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = token.cancelled() => break,
					next = receiver.recv() => match next {
						Some(intent) => {
							publisher.process(&intent).await;
						}
						None => break,
					},
				}
			}
			info!("publisher stopped");
		});

		subscription
	}

	/// Publishes `intent`, parking it for retry when the attempt fails.
	pub async fn process(&self, intent: &NormalizedIntent) -> Option<PublishOutcome> {
		match self.handle_intent(intent).await {
			Ok(outcome) => Some(outcome),
			Err(e) => {
				self.on_failure(intent.clone(), 1, e);
				None
			}
		}
	}

	/// Re-attempts every parked publish once. Returns how many succeeded.
	pub async fn retry_pending(&self) -> usize {
		let mut succeeded = 0;
		for pending in self.retries.drain() {
			match self.handle_intent(&pending.intent).await {
				Ok(_) => succeeded += 1,
				Err(e) => self.on_failure(pending.intent, pending.attempts + 1, e),
			}
		}
		succeeded
	}

	#[instrument(skip_all, fields(dedup_key = %intent.dedup_key()))]
	pub async fn handle_intent(&self, intent: &NormalizedIntent) -> Result<PublishOutcome, PublisherError> {
		let _guard = self.publishing.lock().await;
		let key = intent.dedup_key();
		if self.published.has(&key) {
			return Ok(PublishOutcome::Duplicate);
		}
		intent
			.validate()
			.map_err(|e| PublisherError::InvalidIntent(e.to_string()))?;

		if let Some(intent_id) = self
			.ledger
			.find_registered_external_id(&intent.external_id, self.config.scan_limit)
			.await?
		{
			info!(intent_id, "intent already registered");
			self.remember(key.clone()).await;
			self.publish_event(PublisherEvent::AlreadyRegistered { dedup_key: key });
			return Ok(PublishOutcome::AlreadyRegistered(intent_id));
		}

		let tx_hash = self.publish_intent(intent).await?;
		info!(
			external_id = %intent.external_id,
			tx_hash = %truncate_id(&tx_hash.to_string()),
			"published intent"
		);
		self.remember(key.clone()).await;
		self.publish_event(PublisherEvent::IntentPublished {
			dedup_key: key,
			tx_hash: tx_hash.to_string(),
		});
		Ok(PublishOutcome::Published(tx_hash))
	}

	async fn publish_intent(&self, intent: &NormalizedIntent) -> Result<TxHash, PublisherError> {
		let (params, value) = self.build_params(intent, current_timestamp(), current_timestamp_millis())?;
		if !params.settlement_asset.is_zero() {
			self.ensure_allowance(params.settlement_asset, params.amount_in)
				.await?;
		}
		Ok(self.ledger.create_intent(&params, value).await?)
	}

	async fn ensure_allowance(&self, token: Address, amount: U256) -> Result<(), PublisherError> {
		let owner = self
			.ledger
			.operator_address()
			.ok_or(LedgerError::MissingSigner)?;
		let allowance = self.ledger.allowance(token, owner, self.escrow).await?;
		if allowance < amount {
			let tx_hash = self.ledger.approve(token, self.escrow, amount).await?;
			debug!(%token, tx_hash = %truncate_id(&tx_hash.to_string()), "approved escrow");
		}
		Ok(())
	}

	/// `createIntent` arguments and the native value that goes with them.
	pub fn build_params(
		&self,
		intent: &NormalizedIntent,
		now: u64,
		now_ms: u64,
	) -> Result<(CreateIntentParams, U256), PublisherError> {
		let settlement_asset = self.resolve_asset(&intent.from_token);
		let recipient = self.resolve_recipient(&intent.trader);

		let commit_deadline = now + self.config.commit_window_seconds;
		let reveal_deadline = commit_deadline + self.config.reveal_window_seconds;
		let execution_deadline = reveal_deadline + self.config.execution_window_seconds;

		let mut metadata = intent.metadata.clone();
		if metadata.from_token.is_none() && !intent.from_token.is_empty() {
			metadata.from_token = Some(intent.from_token.clone());
		}
		if metadata.to_token.is_none() && !intent.to_token.is_empty() {
			metadata.to_token = Some(intent.to_token.clone());
		}

		let extra_data = IntentExtraData {
			external_id: intent.external_id.clone(),
			source: intent.source.as_str().to_string(),
			trader: intent.trader.clone(),
			metadata,
			ingested_at: now_ms,
		}
		.encode()
		.map_err(|e| PublisherError::InvalidIntent(e.to_string()))?;

		let value = if settlement_asset.is_zero() {
			intent.amount_in
		} else {
			U256::ZERO
		};

		Ok((
			CreateIntentParams {
				settlement_asset,
				recipient,
				amount_in: intent.amount_in,
				min_amount_out: intent.min_amount_out,
				commit_deadline,
				reveal_deadline,
				execution_deadline,
				extra_data,
			},
			value,
		))
	}

	/// An address is used as is; a symbol is looked up case-insensitively.
	/// Anything else is the native asset.
	pub fn resolve_asset(&self, token: &str) -> Address {
		let token = token.trim();
		if token.is_empty() {
			return Address::ZERO;
		}
		if let Some(address) = parse_address(token) {
			return address;
		}
		self.config
			.settlement_assets
			.iter()
			.find(|asset| asset.symbol.eq_ignore_ascii_case(token))
			.map(|asset| asset.address)
			.unwrap_or(Address::ZERO)
	}

	fn resolve_recipient(&self, trader: &str) -> Address {
		parse_address(trader)
			.or_else(|| self.ledger.operator_address())
			.unwrap_or(Address::ZERO)
	}

	async fn remember(&self, key: String) {
		self.published.add(key);
		if let Err(e) = self.published.persist().await {
			warn!(error = %e, "failed to persist publisher cache");
		}
	}

	fn on_failure(&self, intent: NormalizedIntent, attempts: u32, error: PublisherError) {
		let dedup_key = intent.dedup_key();
		let will_retry = !matches!(error, PublisherError::InvalidIntent(_))
			&& attempts < self.config.max_publish_attempts;

		if will_retry {
			warn!(%dedup_key, attempts, error = %error, "failed to publish intent, will retry");
			self.retries.park(PendingPublish { intent, attempts });
		} else {
			error!(%dedup_key, attempts, error = %error, "failed to publish intent, giving up");
		}

		self.publish_event(PublisherEvent::PublishFailed {
			dedup_key,
			error: error.to_string(),
			will_retry,
		});
	}

	fn publish_event(&self, event: PublisherEvent) {
		if let Some(events) = &self.events {
			events.publish(AuctionEvent::Publisher(event));
		}
	}
}
