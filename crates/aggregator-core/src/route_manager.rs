//! Route aggregation across source instances.

use crate::error::CoreError;
use crate::instance::SourceInstance;
use aggregator_types::{BestRoute, RouteCandidate, RouteRequest, SwapTransaction};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fans route requests out to a fixed, ordered set of sources.
///
/// Registration order is the order of the instances passed to
/// [`RouteManager::new`]; it decides ties between equal quotes.
pub struct RouteManager {
	instances: Vec<Arc<SourceInstance>>,
	quote_timeout: Option<Duration>,
}

impl RouteManager {
	pub fn new(instances: Vec<Arc<SourceInstance>>) -> Result<Self, CoreError> {
		if instances.is_empty() {
			return Err(CoreError::InstanceMisuse(
				"a route manager needs at least one source".to_string(),
			));
		}
		Ok(Self {
			instances,
			quote_timeout: None,
		})
	}

	/// Bounds each source's quote. A source that does not answer in time
	/// contributes no candidate.
	pub fn with_quote_timeout(mut self, timeout: Duration) -> Self {
		self.quote_timeout = Some(timeout);
		self
	}

	pub fn source_names(&self) -> Vec<&str> {
		self.instances.iter().map(|instance| instance.name()).collect()
	}

	/// Queries every source concurrently and returns the best quote.
	///
	/// Failing sources are logged and skipped. Fails with
	/// [`CoreError::NoRoutesFound`] when no source produced a candidate.
	pub async fn get_best_route_data(&self, request: &RouteRequest) -> Result<BestRoute, CoreError> {
		let tasks: Vec<_> = self
			.instances
			.iter()
			.map(|instance| {
				let instance = Arc::clone(instance);
				let request = request.clone();
				tokio::spawn(async move { instance.get_route_data(&request).await })
			})
			.collect();

		let quote_timeout = self.quote_timeout;
		let results = join_all(tasks.into_iter().zip(&self.instances).map(
			|(mut task, instance)| async move {
				let result = match quote_timeout {
					Some(limit) => match tokio::time::timeout(limit, &mut task).await {
						Ok(joined) => joined,
						Err(_) => {
							task.abort();
							return Err(CoreError::TimedOut {
								source_name: instance.name().to_string(),
								after_ms: limit.as_millis() as u64,
							})
						}
					},
					None => task.await,
				};
				result.map_err(|e| CoreError::SourceUnavailable {
					source_name: instance.name().to_string(),
					reason: e.to_string(),
				})?
			},
		))
		.await;

		let mut candidates = Vec::with_capacity(results.len());
		for (instance, result) in self.instances.iter().zip(results) {
			match result {
				Ok(candidate) => {
					debug!(
						"[{}] Quoted {} for {} -> {}",
						instance.name(),
						candidate.output_amount,
						request.token_from,
						request.token_to
					);
					candidates.push(candidate);
				}
				Err(e) => warn!("[{}] Failed to get route data: {}", instance.name(), e),
			}
		}

		let best = select_best(candidates).ok_or(CoreError::NoRoutesFound)?;
		info!(
			"Best route for {} -> {} is {} with output {}",
			request.token_from, request.token_to, best.source_name, best.output_amount
		);
		Ok(best.into())
	}

	/// Builds the transaction for a route returned by
	/// [`RouteManager::get_best_route_data`]. The route payload is handed to
	/// the winning source unmodified.
	pub async fn get_best_route_transaction(
		&self,
		best_route: &BestRoute,
		signer_address: &str,
		slippage_percentage: Decimal,
	) -> Result<SwapTransaction, CoreError> {
		let winner = self
			.instances
			.iter()
			.find(|instance| instance.name() == best_route.winning_source)
			.ok_or_else(|| {
				CoreError::InstanceMisuse(format!(
					"{} is not one of the sources of this route manager",
					best_route.winning_source
				))
			})?;

		winner
			.build_swap_transaction(&best_route.route, signer_address, slippage_percentage)
			.await
	}

	/// Finds the best route for `request` and builds its transaction.
	pub async fn get_best_route_transaction_for(
		&self,
		request: &RouteRequest,
	) -> Result<(BestRoute, SwapTransaction), CoreError> {
		let best = self.get_best_route_data(request).await?;
		let transaction = self
			.get_best_route_transaction(&best, &request.signer_address, request.slippage_percentage)
			.await?;
		Ok((best, transaction))
	}
}

/// Picks the candidate with the strictly greatest output. The earliest
/// candidate wins a tie.
pub fn select_best(candidates: impl IntoIterator<Item = RouteCandidate>) -> Option<RouteCandidate> {
	candidates.into_iter().fold(None, |best, candidate| match best {
		Some(current) if candidate.output_amount <= current.output_amount => Some(current),
		_ => Some(candidate),
	})
}
