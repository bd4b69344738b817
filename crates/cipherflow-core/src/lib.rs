//! Wires the auction agents together from configuration.
//!
//! [`AuctionBuilder`] turns a validated [`cipherflow_config::Config`] into an
//! [`AuctionEngine`] by looking implementations up in each crate's registry.
//! The engine owns the recurring jobs of every enabled role and the shared
//! shutdown signal they all observe.

use thiserror::Error;

pub mod builder;
pub mod engine;
pub mod jobs;
pub mod stats;

pub use builder::AuctionBuilder;
pub use engine::{AuctionEngine, EngineStatus};
pub use stats::{EngineStats, StatsSnapshot};

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}
