//! In-process intent queue with synchronous fan-out.
//!
//! Every enqueue notifies all listeners, in registration order, before it
//! returns. There is no backpressure: a slow listener slows the producer, so
//! listeners should hand work off (e.g. into a channel) and return.

use cipherflow_types::NormalizedIntent;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

pub type IntentListener = Arc<dyn Fn(&NormalizedIntent) + Send + Sync>;

struct QueueState {
	buffer: VecDeque<NormalizedIntent>,
	listeners: Vec<(u64, IntentListener)>,
	next_listener_id: u64,
}

#[derive(Clone)]
pub struct IntentQueue {
	capacity: usize,
	state: Arc<Mutex<QueueState>>,
}

/// Handle returned by [`IntentQueue::on_intent`]. Dropping it keeps the
/// listener registered; call [`unsubscribe`](Subscription::unsubscribe).
pub struct Subscription {
	id: u64,
	state: Weak<Mutex<QueueState>>,
}

impl Subscription {
	pub fn unsubscribe(self) {
		if let Some(state) = self.state.upgrade() {
			let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
			state.listeners.retain(|(id, _)| *id != self.id);
		}
	}
}

impl Default for IntentQueue {
	fn default() -> Self {
		Self::new(DEFAULT_QUEUE_CAPACITY)
	}
}

impl IntentQueue {
	/// `capacity` bounds the introspection buffer; the oldest entries are
	/// dropped first. Listeners see every intent regardless.
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			state: Arc::new(Mutex::new(QueueState {
				buffer: VecDeque::new(),
				listeners: Vec::new(),
				next_listener_id: 0,
			})),
		}
	}

	fn lock(&self) -> MutexGuard<'_, QueueState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn enqueue(&self, intent: NormalizedIntent) {
		let listeners: Vec<IntentListener> = {
			let mut state = self.lock();
			state.buffer.push_back(intent.clone());
			while state.buffer.len() > self.capacity {
				state.buffer.pop_front();
			}
			state.listeners.iter().map(|(_, l)| l.clone()).collect()
		};

		for listener in listeners {
			listener(&intent);
		}
	}

	pub fn enqueue_many(&self, intents: impl IntoIterator<Item = NormalizedIntent>) {
		for intent in intents {
			self.enqueue(intent);
		}
	}

	/// Pops the oldest buffered intent.
	pub fn dequeue(&self) -> Option<NormalizedIntent> {
		self.lock().buffer.pop_front()
	}

	pub fn on_intent<F>(&self, listener: F) -> Subscription
	where
		F: Fn(&NormalizedIntent) + Send + Sync + 'static,
	{
		let mut state = self.lock();
		let id = state.next_listener_id;
		state.next_listener_id += 1;
		state.listeners.push((id, Arc::new(listener)));
		Subscription {
			id,
			state: Arc::downgrade(&self.state),
		}
	}

	pub fn size(&self) -> usize {
		self.lock().buffer.len()
	}

	/// Up to `limit` buffered intents, oldest first. Does not consume.
	pub fn snapshot(&self, limit: usize) -> Vec<NormalizedIntent> {
		self.lock().buffer.iter().take(limit).cloned().collect()
	}

	pub fn listener_count(&self) -> usize {
		self.lock().listeners.len()
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use alloy::primitives::U256;
	use cipherflow_types::{IntentMetadata, IntentSourceKind};

	pub(crate) fn intent(source: IntentSourceKind, external_id: &str) -> NormalizedIntent {
		NormalizedIntent {
			external_id: external_id.to_string(),
			trader: "0x00000000000000000000000000000000000000a1".to_string(),
			from_token: "WETH".to_string(),
			to_token: "USDC".to_string(),
			amount_in: U256::from(100u64),
			min_amount_out: U256::from(90u64),
			source,
			metadata: IntentMetadata::default(),
		}
	}

	#[test]
	fn test_listeners_run_in_registration_order() {
		let queue = IntentQueue::default();
		let seen = Arc::new(Mutex::new(Vec::new()));

		let first = seen.clone();
		queue.on_intent(move |i| first.lock().unwrap().push(format!("a:{}", i.external_id)));
		let second = seen.clone();
		queue.on_intent(move |i| second.lock().unwrap().push(format!("b:{}", i.external_id)));

		queue.enqueue_many(vec![
			intent(IntentSourceKind::Cow, "1"),
			intent(IntentSourceKind::Cow, "2"),
		]);

		assert_eq!(
			*seen.lock().unwrap(),
			vec!["a:1", "b:1", "a:2", "b:2"]
		);
		assert_eq!(queue.size(), 2);
	}

	#[test]
	fn test_unsubscribe_stops_delivery() {
		let queue = IntentQueue::default();
		let count = Arc::new(Mutex::new(0usize));
		let counter = count.clone();
		let subscription = queue.on_intent(move |_| *counter.lock().unwrap() += 1);

		queue.enqueue(intent(IntentSourceKind::Manual, "1"));
		subscription.unsubscribe();
		queue.enqueue(intent(IntentSourceKind::Manual, "2"));

		assert_eq!(*count.lock().unwrap(), 1);
		assert_eq!(queue.listener_count(), 0);
	}

	#[test]
	fn test_snapshot_does_not_consume_and_capacity_drops_oldest() {
		let queue = IntentQueue::new(2);
		for id in ["1", "2", "3"] {
			queue.enqueue(intent(IntentSourceKind::OneInch, id));
		}

		let snapshot = queue.snapshot(10);
		assert_eq!(
			snapshot.iter().map(|i| i.external_id.as_str()).collect::<Vec<_>>(),
			vec!["2", "3"]
		);
		assert_eq!(queue.size(), 2);
		assert_eq!(queue.dequeue().map(|i| i.external_id), Some("2".to_string()));
		assert_eq!(queue.size(), 1);
	}

	#[test]
	fn test_listener_may_enqueue_without_deadlock() {
		let queue = IntentQueue::default();
		let inner = queue.clone();
		queue.on_intent(move |i| {
			if i.external_id == "seed" {
				inner.enqueue(intent(IntentSourceKind::Manual, "echo"));
			}
		});
		queue.enqueue(intent(IntentSourceKind::Manual, "seed"));
		assert_eq!(queue.size(), 2);
	}
}
