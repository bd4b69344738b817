//! Recurring search for open intents the solver has not tried yet.

use crate::{CommitOutcome, CommitmentBuilder};
use cipherflow_storage::DedupCache;
use cipherflow_types::current_timestamp;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, instrument};

/// Commits to each newly discovered open intent at most once per process.
/// An intent that found no route is retried once `no_route_retry` elapses.
pub struct OpenIntentScanner {
	builder: Arc<CommitmentBuilder>,
	attempted: Mutex<HashSet<u64>>,
	no_route: DedupCache,
}

impl OpenIntentScanner {
	pub fn new(builder: Arc<CommitmentBuilder>) -> Self {
		let no_route = DedupCache::in_memory(builder.settings().no_route_retry);
		Self {
			builder,
			attempted: Mutex::new(HashSet::new()),
			no_route,
		}
	}

	pub fn builder(&self) -> &Arc<CommitmentBuilder> {
		&self.builder
	}

	/// Returns how many intents were attempted in this pass.
	#[instrument(skip_all)]
	pub async fn scan_once(&self) -> usize {
		let max_scan = self.builder.settings().max_intent_scan;
		let open = match self
			.builder
			.ledger()
			.open_intents(max_scan, current_timestamp())
			.await
		{
			Ok(open) => open,
			Err(e) => {
				error!(error = %e, "open intent scan failed");
				return 0;
			}
		};

		self.no_route.prune();
		let mut attempts = 0;
		for intent in open {
			let route_key = intent.intent_id.to_string();
			if self.no_route.has(&route_key) {
				continue;
			}
			let first_attempt = self
				.attempted
				.lock()
				.unwrap_or_else(|e| e.into_inner())
				.insert(intent.intent_id);
			if !first_attempt {
				continue;
			}

			attempts += 1;
			let definition = self.builder.swap_definition(&intent);
			match self.builder.submit(&definition).await {
				Ok(CommitOutcome::Committed { tx_hash, .. }) => {
					info!(intent_id = intent.intent_id, %tx_hash, "committed to open intent")
				}
				Ok(CommitOutcome::NoRoute) => {
					debug!(intent_id = intent.intent_id, "no route, retrying later");
					self.attempted
						.lock()
						.unwrap_or_else(|e| e.into_inner())
						.remove(&intent.intent_id);
					self.no_route.add(route_key);
				}
				Ok(outcome) => debug!(intent_id = intent.intent_id, ?outcome, "no commitment made"),
				Err(e) => error!(intent_id = intent.intent_id, error = %e, "commitment attempt failed"),
			}
		}
		attempts
	}

	/// Intents waiting out the no-route retry delay.
	pub fn awaiting_route_count(&self) -> usize {
		self.no_route.len()
	}

	pub fn attempted_count(&self) -> usize {
		self.attempted
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::builder::tests::{builder, open_intent, planner_quoting, SOLVER};
	use crate::CommitmentSettings;
	use alloy::primitives::{Address, U256};
	use cipherflow_ledger::implementations::memory::InMemoryLedger;
	use cipherflow_pricing::RoutePlanner;
	use cipherflow_types::{current_timestamp_millis, IntentMetadata};
	use std::time::Duration;

	#[tokio::test]
	async fn test_each_open_intent_is_attempted_once() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		for _ in 0..2 {
			ledger.insert_intent(open_intent(U256::from(10u64), IntentMetadata::default()));
		}
		let scanner = OpenIntentScanner::new(Arc::new(builder(
			&ledger,
			planner_quoting(U256::from(11u64)),
			CommitmentSettings::new(U256::from(1u64)),
		)));

		assert_eq!(scanner.scan_once().await, 2);
		assert_eq!(ledger.commitments().len(), 2);

		ledger.insert_intent(open_intent(U256::from(10u64), IntentMetadata::default()));
		assert_eq!(scanner.scan_once().await, 1);
		assert_eq!(scanner.scan_once().await, 0);
		assert_eq!(scanner.attempted_count(), 3);
	}

	#[tokio::test]
	async fn test_failed_attempt_does_not_stop_the_pass() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		for _ in 0..2 {
			ledger.insert_intent(open_intent(U256::from(10u64), IntentMetadata::default()));
		}
		ledger.fail_next_writes(1);
		let scanner = OpenIntentScanner::new(Arc::new(builder(
			&ledger,
			planner_quoting(U256::from(11u64)),
			CommitmentSettings::new(U256::from(1u64)),
		)));

		assert_eq!(scanner.scan_once().await, 2);
		assert_eq!(ledger.commitments().len(), 1);
	}

	#[tokio::test]
	async fn test_unrouted_intent_is_retried_after_delay() {
		let ledger = InMemoryLedger::new(Some(SOLVER), Address::ZERO);
		ledger.insert_intent(open_intent(U256::from(10u64), IntentMetadata::default()));
		let mut settings = CommitmentSettings::new(U256::from(1u64));
		settings.no_route_retry = Duration::from_secs(60);
		let scanner = OpenIntentScanner::new(Arc::new(builder(
			&ledger,
			Arc::new(RoutePlanner::new(vec![], U256::from(1u64))),
			settings,
		)));

		assert_eq!(scanner.scan_once().await, 1);
		assert_eq!(scanner.awaiting_route_count(), 1);
		assert_eq!(scanner.attempted_count(), 0);
		assert_eq!(scanner.scan_once().await, 0);

		scanner
			.no_route
			.prune_at(current_timestamp_millis() + 61_000);
		assert_eq!(scanner.awaiting_route_count(), 0);
		assert_eq!(scanner.scan_once().await, 1);
		assert!(ledger.commitments().is_empty());
	}
}
