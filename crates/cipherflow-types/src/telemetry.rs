//! Audit records for commitment attempts.

use crate::quotes::ProfitReport;
use crate::utils::current_timestamp_millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryStatus {
	Planned,
	Committed,
	Failed,
}

/// One step of one commitment attempt.
///
/// All entries of the same attempt share `id`; the log is append-only and
/// newest-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEntry {
	pub id: String,
	pub intent_id: String,
	pub venue: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub venue_label: Option<String>,
	pub amount_in: String,
	pub amount_out: String,
	pub gas_cost: String,
	pub bridge_fee: String,
	pub net_profit: String,
	pub timestamp: u64,
	pub status: TelemetryStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tx_hash: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub warnings: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl TelemetryEntry {
	/// Starts a new attempt in the `planned` state.
	pub fn planned(intent_id: u64, report: &ProfitReport) -> Self {
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			intent_id: intent_id.to_string(),
			venue: report.venue.to_string(),
			venue_label: None,
			amount_in: report.amount_in.to_string(),
			amount_out: report.amount_out.to_string(),
			gas_cost: report.gas_cost.to_string(),
			bridge_fee: report.bridge_fee.to_string(),
			net_profit: report.net_profit.to_string(),
			timestamp: current_timestamp_millis(),
			status: TelemetryStatus::Planned,
			tx_hash: None,
			warnings: report.warnings.clone(),
			error: None,
		}
	}

	pub fn committed(&self, tx_hash: impl Into<String>) -> Self {
		Self {
			timestamp: current_timestamp_millis(),
			status: TelemetryStatus::Committed,
			tx_hash: Some(tx_hash.into()),
			error: None,
			..self.clone()
		}
	}

	pub fn failed(&self, error: impl Into<String>) -> Self {
		Self {
			timestamp: current_timestamp_millis(),
			status: TelemetryStatus::Failed,
			tx_hash: None,
			error: Some(error.into()),
			..self.clone()
		}
	}
}
