//! The `cipherflow` binary's building blocks.
//!
//! - `cli`: argument parsing
//! - `api`: read-only HTTP status endpoints over a running engine

pub mod api;
pub mod cli;
