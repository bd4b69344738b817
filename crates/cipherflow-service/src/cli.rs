//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cipherflow")]
#[command(about = "Sealed-bid intent auction agents", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
	/// Path to configuration file
	#[arg(short, long, value_name = "FILE", default_value = cipherflow_config::DEFAULT_CONFIG_PATH)]
	pub config: PathBuf,

	/// Log level used when RUST_LOG is unset; falls back to
	/// `service.log_level`, which defaults to `info`
	#[arg(long, env = "CIPHERFLOW_LOG_LEVEL")]
	pub log_level: Option<String>,

	#[command(subcommand)]
	pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
	/// Run every enabled role until interrupted
	Run,
	/// Validate the configuration file
	Validate,
	/// Make one commitment attempt
	Commit {
		/// Intent to commit to; defaults to the newest open intent
		#[arg(long)]
		intent_id: Option<u64>,
	},
	/// Run one reveal reconciliation sweep
	Sweep,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_to_run() {
		let args = Args::parse_from(["cipherflow"]);
		assert!(args.command.is_none());
		assert_eq!(args.config, PathBuf::from("config/local.toml"));
	}

	#[test]
	fn test_commit_with_intent() {
		let args = Args::parse_from(["cipherflow", "--config", "a.toml", "commit", "--intent-id", "7"]);
		assert_eq!(args.command, Some(Command::Commit { intent_id: Some(7) }));
		assert_eq!(args.config, PathBuf::from("a.toml"));
	}
}
