//! Route requests, per-source candidates and the aggregated result.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A trade the caller wants routed across all sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
	pub token_from: String,
	pub token_to: String,
	/// Input amount in human-readable units of `token_from`.
	pub amount: Decimal,
	pub slippage_percentage: Decimal,
	pub signer_address: String,
}

/// Per-source form of a route request.
///
/// The input amount is already converted to smallest-unit precision using
/// the decimals the source itself has cached for `coin_type_from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteQuery {
	pub coin_type_from: String,
	pub coin_type_to: String,
	pub input_amount: Decimal,
	pub input_amount_raw: u128,
	pub slippage_percentage: Decimal,
	pub signer_address: String,
}

/// What a source answers for a route query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRoute {
	/// Quoted output in smallest-unit precision.
	pub output_amount: u128,
	/// Backend-specific payload, passed back to the source unmodified.
	pub route: serde_json::Value,
}

/// One source's proposal for a request. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteCandidate {
	pub source_name: String,
	pub output_amount: u128,
	pub route_detail: serde_json::Value,
}

/// The winning candidate of an aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestRoute {
	pub winning_source: String,
	pub output_amount: u128,
	pub route: serde_json::Value,
}

impl From<RouteCandidate> for BestRoute {
	fn from(candidate: RouteCandidate) -> Self {
		Self {
			winning_source: candidate.source_name,
			output_amount: candidate.output_amount,
			route: candidate.route_detail,
		}
	}
}

/// Transaction built by a source from one of its own routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransaction {
	pub source_name: String,
	pub payload: serde_json::Value,
}
