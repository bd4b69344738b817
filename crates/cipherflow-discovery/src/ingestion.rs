//! Polls intent sources and forwards first-seen intents to the queue.

use crate::{IntentQueue, IntentSourceInterface};
use cipherflow_storage::DedupCache;
use cipherflow_types::{AuctionEvent, EventBus, IngestionEvent, NormalizedIntent};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct IngestionConfig {
	pub poll_interval: Duration,
	pub dedup_ttl: Duration,
}

impl Default for IngestionConfig {
	fn default() -> Self {
		Self {
			poll_interval: DEFAULT_POLL_INTERVAL,
			dedup_ttl: DEFAULT_DEDUP_TTL,
		}
	}
}

pub struct IngestionService {
	sources: Vec<Box<dyn IntentSourceInterface>>,
	queue: IntentQueue,
	seen: DedupCache,
	poll_interval: Duration,
	events: Option<EventBus>,
	running: Mutex<Option<CancellationToken>>,
}

impl IngestionService {
	pub fn new(
		sources: Vec<Box<dyn IntentSourceInterface>>,
		queue: IntentQueue,
		config: IngestionConfig,
	) -> Self {
		Self {
			sources,
			queue,
			seen: DedupCache::in_memory(config.dedup_ttl),
			poll_interval: config.poll_interval,
			events: None,
			running: Mutex::new(None),
		}
	}

	pub fn with_event_bus(mut self, events: EventBus) -> Self {
		self.events = Some(events);
		self
	}

	pub fn queue(&self) -> &IntentQueue {
		&self.queue
	}

	/// Runs one poll of every source and returns how many intents were
	/// forwarded. A failing source counts as an empty one.
	#[instrument(skip_all)]
	pub async fn poll_once(&self) -> usize {
		let results = join_all(self.sources.iter().map(|source| async move {
			(source.kind(), source.pull_intents().await)
		}))
		.await;

		let mut forwarded: Vec<NormalizedIntent> = Vec::new();
		for (kind, result) in results {
			match result {
				Ok(intents) => {
					let before = forwarded.len();
					forwarded.extend(
						intents
							.into_iter()
							.filter(|intent| self.seen.add(intent.dedup_key())),
					);
					let fresh = forwarded.len() - before;
					if fresh > 0 {
						info!(source = %kind, count = fresh, "ingested intents");
					}
				}
				Err(e) => error!(source = %kind, error = %e, "source failure"),
			}
		}

		let count = forwarded.len();
		if count > 0 {
			self.queue.enqueue_many(forwarded);
			if let Some(events) = &self.events {
				events.publish(AuctionEvent::Ingestion(IngestionEvent::IntentsIngested {
					forwarded: count,
				}));
			}
		}

		self.seen.prune();
		count
	}

	/// Starts polling: one poll immediately, then one `poll_interval` after
	/// each poll completes. A second call while running does nothing.
	pub fn start(self: &Arc<Self>, shutdown: &CancellationToken) {
		let token = {
			let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
			if running.is_some() {
				return;
			}
			let token = shutdown.child_token();
			*running = Some(token.clone());
			token
		};

		let service = Arc::clone(self);
		tokio::spawn(async move {
			info!(
				sources = service.sources.len(),
				interval_secs = service.poll_interval.as_secs(),
				"ingestion started"
			);
			loop {
				if token.is_cancelled() {
					break;
				}
				service.poll_once().await;
				tokio::select! {
					_ = token.cancelled() => break,
					_ = tokio::time::sleep(service.poll_interval) => {}
				}
			}
			info!("ingestion stopped");
		});
	}

	/// Cancels the pending poll. Safe to call repeatedly.
	pub fn stop(&self) {
		let token = self
			.running
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.take();
		if let Some(token) = token {
			token.cancel();
		}
	}

	pub fn is_running(&self) -> bool {
		self.running
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::queue::tests::intent;
	use crate::{MockIntentSourceInterface, SourceError};
	use cipherflow_types::IntentSourceKind;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn source(
		kind: IntentSourceKind,
		batch: Vec<NormalizedIntent>,
	) -> Box<dyn IntentSourceInterface> {
		let mut source = MockIntentSourceInterface::new();
		source.expect_kind().return_const(kind);
		source.expect_pull_intents().returning(move || {
			let batch = batch.clone();
			Box::pin(async move { Ok(batch) })
		});
		Box::new(source)
	}

	fn failing(kind: IntentSourceKind) -> Box<dyn IntentSourceInterface> {
		let mut source = MockIntentSourceInterface::new();
		source.expect_kind().return_const(kind);
		source.expect_pull_intents().returning(|| {
			Box::pin(async move { Err(SourceError::Http("connection refused".into())) })
		});
		Box::new(source)
	}

	#[tokio::test]
	async fn test_distinct_sources_are_distinct_keys() {
		let queue = IntentQueue::default();
		let service = IngestionService::new(
			vec![
				source(IntentSourceKind::Cow, vec![intent(IntentSourceKind::Cow, "order-1")]),
				source(
					IntentSourceKind::OneInch,
					vec![intent(IntentSourceKind::OneInch, "order-1")],
				),
				source(
					IntentSourceKind::Manual,
					vec![intent(IntentSourceKind::Manual, "order-1")],
				),
			],
			queue.clone(),
			IngestionConfig::default(),
		);

		assert_eq!(service.poll_once().await, 3);
		assert_eq!(queue.size(), 3);
	}

	#[tokio::test]
	async fn test_repeats_forwarded_once_per_window() {
		let queue = IntentQueue::default();
		let service = IngestionService::new(
			vec![source(
				IntentSourceKind::Cow,
				vec![
					intent(IntentSourceKind::Cow, "order-1"),
					intent(IntentSourceKind::Cow, "order-1"),
				],
			)],
			queue.clone(),
			IngestionConfig::default(),
		);

		assert_eq!(service.poll_once().await, 1);
		assert_eq!(service.poll_once().await, 0);
		assert_eq!(queue.size(), 1);
	}

	#[tokio::test]
	async fn test_failing_source_does_not_block_others() {
		let queue = IntentQueue::default();
		let batches = Arc::new(AtomicUsize::new(0));
		let counter = batches.clone();
		queue.on_intent(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		let service = IngestionService::new(
			vec![
				failing(IntentSourceKind::OneInch),
				source(IntentSourceKind::Cow, vec![intent(IntentSourceKind::Cow, "order-2")]),
			],
			queue,
			IngestionConfig::default(),
		);

		assert_eq!(service.poll_once().await, 1);
		assert_eq!(batches.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_event_reports_forwarded_count() {
		let events = EventBus::new(8);
		let mut receiver = events.subscribe();
		let service = IngestionService::new(
			vec![source(IntentSourceKind::Cow, vec![intent(IntentSourceKind::Cow, "order-3")])],
			IntentQueue::default(),
			IngestionConfig::default(),
		)
		.with_event_bus(events);

		service.poll_once().await;
		match receiver.recv().await.unwrap() {
			AuctionEvent::Ingestion(IngestionEvent::IntentsIngested { forwarded }) => {
				assert_eq!(forwarded, 1)
			}
			other => panic!("unexpected event {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_start_polls_and_stop_is_idempotent() {
		let queue = IntentQueue::default();
		let service = Arc::new(IngestionService::new(
			vec![source(IntentSourceKind::Cow, vec![intent(IntentSourceKind::Cow, "order-4")])],
			queue.clone(),
			IngestionConfig {
				poll_interval: Duration::from_millis(10),
				dedup_ttl: Duration::from_secs(300),
			},
		));

		let shutdown = CancellationToken::new();
		service.start(&shutdown);
		service.start(&shutdown);
		assert!(service.is_running());

		tokio::time::sleep(Duration::from_millis(50)).await;
		service.stop();
		service.stop();
		assert!(!service.is_running());
		assert_eq!(queue.size(), 1);
	}
}
