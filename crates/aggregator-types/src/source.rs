//! The seam between the aggregation core and backend-specific collaborators.
//!
//! A liquidity source knows how to list its tradable assets, how to quote a
//! route and how to turn one of its own routes into a transaction. All of
//! that logic lives outside the core; the core only caches what
//! `fetch_snapshot` returns and compares what `get_route_data` quotes.

use crate::assets::{PathTable, SourceSnapshot};
use crate::route::{RouteQuery, SourceRoute, SwapTransaction};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by a liquidity source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
	/// The requested asset is not in the source's cache.
	#[error("Coin {0} does not exist")]
	AssetNotFound(String),
	/// The backend could not be reached or refused the request.
	#[error("Source unavailable: {0}")]
	Unavailable(String),
	/// The backend answered with data of an unexpected shape.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// The source was asked for something it does not support.
	#[error("Unsupported operation: {0}")]
	Unsupported(String),
}

/// Static capabilities a source declares up front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCapabilities {
	/// Whether the source exposes its pool paths through [`PathSource`].
	pub supports_path_enumeration: bool,
}

/// Optional second interface for sources that enumerate their pools.
#[async_trait]
pub trait PathSource: Send + Sync {
	async fn fetch_paths(&self) -> Result<PathTable, SourceError>;
}

#[async_trait]
pub trait LiquiditySource: Send + Sync {
	/// Name used as the storage namespace and in aggregation results.
	fn name(&self) -> &str;

	fn capabilities(&self) -> SourceCapabilities {
		SourceCapabilities::default()
	}

	/// Path enumeration interface. Callers consult
	/// [`SourceCapabilities::supports_path_enumeration`] before using it.
	fn as_path_source(&self) -> Option<&dyn PathSource> {
		None
	}

	/// Fetches the full asset universe of the source.
	async fn fetch_snapshot(&self) -> Result<SourceSnapshot, SourceError>;

	/// Quotes the best route this source can offer.
	async fn get_route_data(&self, query: &RouteQuery) -> Result<SourceRoute, SourceError>;

	/// Builds a transaction from a route previously returned by
	/// [`LiquiditySource::get_route_data`] without quoting again.
	async fn build_swap_transaction(
		&self,
		route: &serde_json::Value,
		signer_address: &str,
		slippage_percentage: Decimal,
	) -> Result<SwapTransaction, SourceError>;
}
