//! Read-only HTTP status API.

use axum::{
	extract::{Query, State},
	response::Json,
	routing::get,
	Router,
};
use cipherflow_core::{AuctionEngine, EngineStatus};
use cipherflow_types::{NormalizedIntent, TelemetryEntry};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

const DEFAULT_INTENT_LIMIT: usize = 50;

#[derive(Clone)]
struct AppState {
	engine: Arc<AuctionEngine>,
}

#[derive(Debug, Deserialize)]
struct IntentsQuery {
	limit: Option<usize>,
}

pub fn router(engine: Arc<AuctionEngine>) -> Router {
	Router::new()
		.route("/health", get(health_check))
		.route("/status", get(get_status))
		.route("/intents", get(get_intents))
		.route("/telemetry", get(get_telemetry))
		.with_state(AppState { engine })
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

/// Serves the API on `port` until `shutdown` fires.
pub async fn serve(
	engine: Arc<AuctionEngine>,
	port: u16,
	shutdown: CancellationToken,
) -> anyhow::Result<()> {
	let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
	info!("API server listening on port {}", port);

	axum::serve(listener, router(engine))
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await?;
	Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
	Json(serde_json::json!({
		"status": "ok",
		"timestamp": chrono::Utc::now().timestamp()
	}))
}

async fn get_status(State(state): State<AppState>) -> Json<EngineStatus> {
	Json(state.engine.status())
}

async fn get_intents(
	State(state): State<AppState>,
	Query(query): Query<IntentsQuery>,
) -> Json<Vec<NormalizedIntent>> {
	let limit = query.limit.unwrap_or(DEFAULT_INTENT_LIMIT);
	Json(state.engine.queue().snapshot(limit))
}

async fn get_telemetry(State(state): State<AppState>) -> Json<Vec<TelemetryEntry>> {
	Json(state.engine.telemetry_entries().await)
}
