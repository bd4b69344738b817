//! Counters derived from the event bus.

use cipherflow_types::{
	AuctionEvent, CommitmentEvent, EventBus, ExecutionEvent, IngestionEvent, PublisherEvent,
	TelemetryStatus,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Default)]
pub struct EngineStats {
	intents_ingested: AtomicU64,
	intents_published: AtomicU64,
	already_registered: AtomicU64,
	publish_failures: AtomicU64,
	routes_planned: AtomicU64,
	commitments_submitted: AtomicU64,
	commitment_failures: AtomicU64,
	executions_completed: AtomicU64,
	executions_recorded: AtomicU64,
	execution_failures: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
	pub intents_ingested: u64,
	pub intents_published: u64,
	pub already_registered: u64,
	pub publish_failures: u64,
	pub routes_planned: u64,
	pub commitments_submitted: u64,
	pub commitment_failures: u64,
	pub executions_completed: u64,
	pub executions_recorded: u64,
	pub execution_failures: u64,
}

fn bump(counter: &AtomicU64, by: u64) {
	counter.fetch_add(by, Ordering::Relaxed);
}

impl EngineStats {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record(&self, event: &AuctionEvent) {
		match event {
			AuctionEvent::Ingestion(IngestionEvent::IntentsIngested { forwarded }) => {
				bump(&self.intents_ingested, *forwarded as u64)
			}
			AuctionEvent::Publisher(event) => match event {
				PublisherEvent::IntentPublished { .. } => bump(&self.intents_published, 1),
				PublisherEvent::AlreadyRegistered { .. } => bump(&self.already_registered, 1),
				PublisherEvent::PublishFailed { .. } => bump(&self.publish_failures, 1),
			},
			AuctionEvent::Commitment(CommitmentEvent::Recorded { status, .. }) => match status {
				TelemetryStatus::Planned => bump(&self.routes_planned, 1),
				TelemetryStatus::Committed => bump(&self.commitments_submitted, 1),
				TelemetryStatus::Failed => bump(&self.commitment_failures, 1),
			},
			AuctionEvent::Execution(event) => match event {
				ExecutionEvent::Completed { recorded, .. } => {
					bump(&self.executions_completed, 1);
					if *recorded {
						bump(&self.executions_recorded, 1);
					}
				}
				ExecutionEvent::Failed { .. } => bump(&self.execution_failures, 1),
			},
		}
	}

	pub fn snapshot(&self) -> StatsSnapshot {
		let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
		StatsSnapshot {
			intents_ingested: load(&self.intents_ingested),
			intents_published: load(&self.intents_published),
			already_registered: load(&self.already_registered),
			publish_failures: load(&self.publish_failures),
			routes_planned: load(&self.routes_planned),
			commitments_submitted: load(&self.commitments_submitted),
			commitment_failures: load(&self.commitment_failures),
			executions_completed: load(&self.executions_completed),
			executions_recorded: load(&self.executions_recorded),
			execution_failures: load(&self.execution_failures),
		}
	}

	/// Subscribes to `events` and counts until `shutdown` fires or the bus
	/// closes. Lagging loses counts, never the collector.
	pub fn spawn_collector(
		self: &Arc<Self>,
		events: &EventBus,
		shutdown: CancellationToken,
	) -> JoinHandle<()> {
		let stats = Arc::clone(self);
		let mut receiver = events.subscribe();
		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = shutdown.cancelled() => break,
					event = receiver.recv() => match event {
						Ok(event) => stats.record(&event),
						Err(RecvError::Lagged(skipped)) => {
							warn!(skipped, "stats collector lagged behind the event bus");
						}
						Err(RecvError::Closed) => break,
					},
				}
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn test_record_counts_by_kind() {
		let stats = EngineStats::new();
		stats.record(&AuctionEvent::Ingestion(IngestionEvent::IntentsIngested {
			forwarded: 3,
		}));
		stats.record(&AuctionEvent::Commitment(CommitmentEvent::Recorded {
			intent_id: 1,
			status: TelemetryStatus::Committed,
			tx_hash: Some("0xabc".into()),
		}));
		stats.record(&AuctionEvent::Execution(ExecutionEvent::Completed {
			commitment_id: 1,
			intent_id: 1,
			recorded: false,
		}));
		stats.record(&AuctionEvent::Execution(ExecutionEvent::Failed {
			commitment_id: 2,
			error: "boom".into(),
		}));

		let snapshot = stats.snapshot();
		assert_eq!(snapshot.intents_ingested, 3);
		assert_eq!(snapshot.commitments_submitted, 1);
		assert_eq!(snapshot.executions_completed, 1);
		assert_eq!(snapshot.executions_recorded, 0);
		assert_eq!(snapshot.execution_failures, 1);
		assert_eq!(snapshot.publish_failures, 0);
	}

	#[tokio::test]
	async fn test_collector_follows_the_bus() {
		let stats = Arc::new(EngineStats::new());
		let events = EventBus::new(16);
		let shutdown = CancellationToken::new();
		let handle = stats.spawn_collector(&events, shutdown.clone());

		events.publish(AuctionEvent::Publisher(PublisherEvent::PublishFailed {
			dedup_key: "cow:1".into(),
			error: "reverted".into(),
			will_retry: true,
		}));

		for _ in 0..50 {
			if stats.snapshot().publish_failures == 1 {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert_eq!(stats.snapshot().publish_failures, 1);

		shutdown.cancel();
		handle.await.unwrap();
	}
}
