//! Registers ingested intents on the ledger of record.
//!
//! The [`IntentPublisher`] listens on the intent queue, skips keys it has
//! already registered (persisted across restarts) or that the ledger already
//! carries, and submits the rest with deadlines and funding. Failed
//! publishes are parked in a bounded retry list.

use cipherflow_ledger::LedgerError;
use cipherflow_storage::StorageError;
use thiserror::Error;

pub mod publisher;
pub mod retry;

pub use publisher::{IntentPublisher, PublishOutcome, PublisherConfig, SettlementAsset};
pub use retry::{PendingPublish, RetryQueue};

#[derive(Debug, Error)]
pub enum PublisherError {
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Invalid intent: {0}")]
	InvalidIntent(String),
}
