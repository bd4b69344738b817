//! Shared data model for the cipherflow intent auction.
//!
//! Every agent in the workspace (listener, solver, executor) speaks in terms of
//! the types defined here: normalized and on-ledger intents, quotes and profit
//! reports, sealed commitments, telemetry entries and the event bus.

pub mod commitment;
pub mod events;
pub mod intents;
pub mod quotes;
pub mod telemetry;
pub mod utils;
pub mod validation;

pub use commitment::*;
pub use events::*;
pub use intents::*;
pub use quotes::*;
pub use telemetry::*;
pub use utils::{current_timestamp, current_timestamp_millis, parse_address, truncate_id};
pub use validation::*;
