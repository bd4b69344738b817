use anyhow::{Context, Result};
use cipherflow_commitment::CommitOutcome;
use cipherflow_config::{Config, ConfigLoader};
use cipherflow_core::{AuctionBuilder, AuctionEngine};
use cipherflow_service::api;
use cipherflow_service::cli::{Args, Command};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();
	let config = load_config(&args.config).await?;
	setup_tracing(args.log_level.as_deref().unwrap_or(&config.service.log_level))?;

	match args.command.unwrap_or(Command::Run) {
		Command::Run => run_service(config).await,
		Command::Validate => validate_config(&args.config, &config),
		Command::Commit { intent_id } => commit(config, intent_id).await,
		Command::Sweep => sweep(config).await,
	}
}

async fn load_config(path: &Path) -> Result<Config> {
	ConfigLoader::new()
		.with_file(path)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {}", path.display()))
}

async fn build_engine(config: Config) -> Result<AuctionEngine> {
	AuctionBuilder::new(config)
		.with_default_implementations()
		.build()
		.await
		.context("Failed to build auction engine")
}

async fn run_service(config: Config) -> Result<()> {
	info!("Starting cipherflow on {}", config.network.name);
	let api_enabled = config.service.api_enabled;
	let http_port = config.service.http_port;

	let engine = Arc::new(build_engine(config).await?);
	let shutdown = engine.shutdown_token();
	tokio::spawn(cancel_on_signal(shutdown.clone()));

	let http_handle = if api_enabled {
		let engine = engine.clone();
		let shutdown = shutdown.clone();
		Some(tokio::spawn(async move {
			if let Err(e) = api::serve(engine, http_port, shutdown.clone()).await {
				error!(error = %e, "API server failed");
				shutdown.cancel();
			}
		}))
	} else {
		None
	};

	engine.run().await.context("Auction engine failed")?;

	if let Some(handle) = http_handle {
		if let Err(e) = handle.await {
			warn!(error = %e, "API server task ended abnormally");
		}
	}
	info!("cipherflow stopped");
	Ok(())
}

fn validate_config(path: &Path, config: &Config) -> Result<()> {
	info!("Configuration {} is valid", path.display());
	info!("Service: {} on {} (chain {})", config.service.id, config.network.name, config.network.chain_id);
	info!("  Storage: {}", config.storage.primary);
	info!("  Ledger: {}", config.ledger.primary);
	if config.discovery.enabled {
		let mut sources: Vec<&String> = config.discovery.sources.keys().collect();
		sources.sort();
		info!("  Discovery: {:?}", sources);
	}
	info!("  Publisher: {}", config.publisher.enabled);
	info!("  Solver: {}", config.solver.enabled);
	info!("  Executor: {}", config.executor.enabled);
	Ok(())
}

/// Runs only the solver role for a single attempt.
async fn commit(mut config: Config, intent_id: Option<u64>) -> Result<()> {
	config.discovery.enabled = false;
	config.publisher.enabled = false;
	config.executor.enabled = false;
	config.solver.enabled = true;
	config.validate().context("Invalid solver configuration")?;

	let engine = build_engine(config).await?;
	match engine.commit_once(intent_id).await.context("Commitment failed")? {
		CommitOutcome::NoRoute => info!("No route found, nothing committed"),
		CommitOutcome::Planned(report) => info!(
			"Planned route on {} with net profit {}",
			report.venue, report.net_profit
		),
		CommitOutcome::Committed {
			tx_hash,
			target_block,
			..
		} => info!("Committed in {} unlocking at block {}", tx_hash, target_block),
	}
	Ok(())
}

/// Runs only the executor role for one reconciliation sweep.
async fn sweep(mut config: Config) -> Result<()> {
	config.discovery.enabled = false;
	config.publisher.enabled = false;
	config.solver.enabled = false;
	config.executor.enabled = true;
	config.validate().context("Invalid executor configuration")?;

	let engine = build_engine(config).await?;
	let completed = engine.sweep_once().await.context("Sweep failed")?;
	info!("Sweep completed {} commitments", completed);
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.try_init()
		.context("Failed to install tracing subscriber")?;

	Ok(())
}

async fn cancel_on_signal(shutdown: CancellationToken) {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!(error = %e, "failed to listen for Ctrl+C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				error!(error = %e, "failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
		_ = shutdown.cancelled() => return,
	}
	info!("Shutdown signal received, stopping services...");
	shutdown.cancel();
}
