//! Subcommand implementations.
//!
//! Each command builds its own [`SourceRegistry`] from the configuration
//! and releases every instance before returning.

use crate::cli::FindRouteArgs;
use crate::implementations::http::HttpSource;
use aggregator_config::{AppConfig, SourceConfig, SourceKind};
use aggregator_core::{
	CoinManager, CoreError, EventBus, InstanceConfig, RouteManager, SourceInstance, SourceRegistry,
};
use aggregator_storage::create_storage;
use aggregator_types::{
	format_raw_amount, LiquiditySource, RouteRequest, SourceError, SourceOptions,
};
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Builds the collaborator for one configured source.
pub fn build_source(config: &SourceConfig) -> Result<Arc<dyn LiquiditySource>, SourceError> {
	match config.kind {
		SourceKind::Http => Ok(Arc::new(HttpSource::from_config(config)?)),
	}
}

pub fn build_registry(config: &AppConfig) -> SourceRegistry {
	SourceRegistry::new(Arc::new(create_storage(&config.storage)), EventBus::default())
}

/// Acquires every configured source in configuration order, letting
/// `adjust` override the configured options.
///
/// When any source fails, the sources already acquired are released
/// before the error is returned.
pub async fn acquire_all(
	registry: &SourceRegistry,
	config: &AppConfig,
	adjust: impl Fn(SourceOptions) -> SourceOptions,
) -> Result<Vec<Arc<SourceInstance>>> {
	let mut instances = Vec::with_capacity(config.sources.len());
	for source_config in &config.sources {
		match acquire_source(registry, source_config, &adjust).await {
			Ok(instance) => instances.push(instance),
			Err(e) => {
				warn!(
					"Releasing {} acquired sources after {} failed",
					instances.len(),
					source_config.name
				);
				registry.release_all().await;
				return Err(e);
			}
		}
	}
	Ok(instances)
}

async fn acquire_source(
	registry: &SourceRegistry,
	source_config: &SourceConfig,
	adjust: &impl Fn(SourceOptions) -> SourceOptions,
) -> Result<Arc<SourceInstance>> {
	let source = build_source(source_config)
		.with_context(|| format!("Failed to build source {}", source_config.name))?;
	let options = adjust(source_config.options.clone());
	registry
		.acquire(&source_config.name, Some(InstanceConfig::new(source, options)))
		.await
		.with_context(|| format!("Failed to acquire source {}", source_config.name))
}

/// Refreshes every source once, waiting for each, and stores the result.
pub async fn update_caches(config: &AppConfig) -> Result<()> {
	let registry = build_registry(config);
	let instances = acquire_all(&registry, config, |mut options| {
		options.lazy_loading = false;
		options.cache.update_intervally = false;
		options
	})
	.await?;

	for instance in &instances {
		if instance.is_ready() {
			info!("[{}] Cache holds {} coins", instance.name(), instance.coins().len());
		} else {
			warn!("[{}] Cache is still empty", instance.name());
		}
	}

	registry.release_all().await;
	info!("Caches update finished for {} sources", instances.len());
	Ok(())
}

/// Keeps every source refreshing on its configured interval until
/// `shutdown` resolves.
pub async fn watch_caches(config: &AppConfig, shutdown: impl Future<Output = ()>) -> Result<()> {
	let registry = build_registry(config);
	let coin_manager = Arc::new(CoinManager::new());
	let coin_task = registry.events().attach(coin_manager.clone());

	let instances = match acquire_all(&registry, config, |options| options).await {
		Ok(instances) => instances,
		Err(e) => {
			coin_task.abort();
			return Err(e);
		}
	};
	info!("Watching caches of {} sources", instances.len());

	shutdown.await;
	info!("Shutdown signal received, stopping cache updates...");

	registry.release_all().await;
	coin_task.abort();

	for (source_name, coins) in coin_manager.all_coins() {
		info!("[{}] Last known coin count: {}", source_name, coins.len());
	}
	Ok(())
}

/// Runs the aggregator once, or on an interval until `shutdown` resolves.
pub async fn find_route(
	config: &AppConfig,
	args: &FindRouteArgs,
	shutdown: impl Future<Output = ()>,
) -> Result<()> {
	if args.build_tx && args.signer.is_none() {
		anyhow::bail!("--build-tx requires --signer");
	}

	let registry = build_registry(config);
	let instances = acquire_all(&registry, config, |mut options| {
		options.lazy_loading = false;
		options
	})
	.await?;

	let output_decimals = CoinManager::from_instances(&instances)
		.find_coin(&args.to)
		.map(|(_, record)| record.decimals);

	let mut manager = RouteManager::new(instances)?;
	if let Some(timeout_ms) = config.route.quote_timeout_ms {
		manager = manager.with_quote_timeout(Duration::from_millis(timeout_ms));
	}

	let request = RouteRequest {
		token_from: args.from.clone(),
		token_to: args.to.clone(),
		amount: args.amount,
		slippage_percentage: args.slippage,
		signer_address: args.signer.clone().unwrap_or_default(),
	};

	let result = match args.interval_ms {
		None => run_route_search(&manager, &request, args.build_tx, output_decimals).await,
		Some(interval_ms) => {
			let period = Duration::from_millis(interval_ms.max(1));
			let mut ticker = tokio::time::interval(period);
			// A tick that fires while a search is still running is dropped
			ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
			tokio::pin!(shutdown);

			loop {
				tokio::select! {
					_ = ticker.tick() => {
						match run_route_search(&manager, &request, args.build_tx, output_decimals).await {
							Ok(()) => {}
							Err(CoreError::NoRoutesFound) => warn!("No routes found, retrying on next tick"),
							Err(e) => error!("Route search failed: {}", e),
						}
					}
					_ = &mut shutdown => {
						info!("Shutdown signal received, stopping route search...");
						break Ok(());
					}
				}
			}
		}
	};

	registry.release_all().await;
	result.context("Failed to find a route")
}

async fn run_route_search(
	manager: &RouteManager,
	request: &RouteRequest,
	build_tx: bool,
	output_decimals: Option<u8>,
) -> Result<(), CoreError> {
	let (best, transaction) = if build_tx {
		let (best, transaction) = manager.get_best_route_transaction_for(request).await?;
		(best, Some(transaction))
	} else {
		(manager.get_best_route_data(request).await?, None)
	};

	if let Some(decimals) = output_decimals {
		match format_raw_amount(best.output_amount, decimals) {
			Ok(amount) => info!("{} {} via {}", amount, request.token_to, best.winning_source),
			Err(e) => warn!("Failed to format output amount: {}", e),
		}
	}

	let output = serde_json::json!({ "bestRoute": best, "transaction": transaction });

	match serde_json::to_string_pretty(&output) {
		Ok(rendered) => println!("{}", rendered),
		Err(e) => error!("Failed to render route: {}", e),
	}
	Ok(())
}

/// Logs what a valid configuration contains.
pub fn validate(config: &AppConfig) {
	info!("Configuration is valid");
	info!("Service name: {}", config.service.name);
	info!("Storage backend: {:?}", config.storage);
	for source in &config.sources {
		info!(
			"  Source: {} ({:?}, {}) refresh every {}ms",
			source.name, source.kind, source.base_url, source.options.cache.update_interval_ms
		);
	}
}
