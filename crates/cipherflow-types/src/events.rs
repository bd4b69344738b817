//! Lifecycle events broadcast between agents.

use crate::telemetry::TelemetryStatus;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum AuctionEvent {
	Ingestion(IngestionEvent),
	Publisher(PublisherEvent),
	Commitment(CommitmentEvent),
	Execution(ExecutionEvent),
}

#[derive(Debug, Clone)]
pub enum IngestionEvent {
	IntentsIngested { forwarded: usize },
}

#[derive(Debug, Clone)]
pub enum PublisherEvent {
	IntentPublished {
		dedup_key: String,
		tx_hash: String,
	},
	AlreadyRegistered {
		dedup_key: String,
	},
	PublishFailed {
		dedup_key: String,
		error: String,
		will_retry: bool,
	},
}

#[derive(Debug, Clone)]
pub enum CommitmentEvent {
	Recorded {
		intent_id: u64,
		status: TelemetryStatus,
		tx_hash: Option<String>,
	},
}

#[derive(Debug, Clone)]
pub enum ExecutionEvent {
	Completed {
		commitment_id: u64,
		intent_id: u64,
		recorded: bool,
	},
	Failed {
		commitment_id: u64,
		error: String,
	},
}

/// Broadcast bus shared by every agent in the process.
///
/// Publishing never fails the publisher: with no subscribers the event is
/// simply dropped.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<AuctionEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<AuctionEvent> {
		self.sender.subscribe()
	}

	pub fn publish(&self, event: AuctionEvent) {
		let _ = self.sender.send(event);
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_subscribers_each_receive_events() {
		let bus = EventBus::new(8);
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		bus.publish(AuctionEvent::Ingestion(IngestionEvent::IntentsIngested {
			forwarded: 3,
		}));

		for receiver in [&mut first, &mut second] {
			match receiver.recv().await.unwrap() {
				AuctionEvent::Ingestion(IngestionEvent::IntentsIngested { forwarded }) => {
					assert_eq!(forwarded, 3)
				}
				other => panic!("unexpected event {:?}", other),
			}
		}
	}

	#[test]
	fn test_publish_without_subscribers_is_silent() {
		let bus = EventBus::default();
		bus.publish(AuctionEvent::Execution(ExecutionEvent::Failed {
			commitment_id: 1,
			error: "boom".into(),
		}));
	}
}
