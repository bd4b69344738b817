//! Bounded list of publishes waiting for another attempt.

use cipherflow_types::NormalizedIntent;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

pub const DEFAULT_RETRY_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct PendingPublish {
	pub intent: NormalizedIntent,
	/// Attempts made so far, including the one that parked it.
	pub attempts: u32,
}

pub struct RetryQueue {
	capacity: usize,
	pending: Mutex<VecDeque<PendingPublish>>,
}

impl Default for RetryQueue {
	fn default() -> Self {
		Self::new(DEFAULT_RETRY_CAPACITY)
	}
}

impl RetryQueue {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			pending: Mutex::new(VecDeque::new()),
		}
	}

	fn lock(&self) -> MutexGuard<'_, VecDeque<PendingPublish>> {
		self.pending.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Parks `entry`. A key already parked is replaced; when full the oldest
	/// entry is dropped.
	pub fn park(&self, entry: PendingPublish) {
		let key = entry.intent.dedup_key();
		let mut pending = self.lock();
		pending.retain(|p| p.intent.dedup_key() != key);
		if pending.len() >= self.capacity {
			if let Some(dropped) = pending.pop_front() {
				warn!(
					dedup_key = %dropped.intent.dedup_key(),
					attempts = dropped.attempts,
					"retry list full, dropping oldest publish"
				);
			}
		}
		pending.push_back(entry);
	}

	/// Takes everything parked, oldest first.
	pub fn drain(&self) -> Vec<PendingPublish> {
		self.lock().drain(..).collect()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}
}
