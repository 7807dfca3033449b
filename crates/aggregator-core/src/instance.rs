//! A live source: its client, cache, refresher and background tasks.

use crate::cache::{hydrate, CacheSnapshot, SourceCache};
use crate::error::CoreError;
use crate::event_bus::EventBus;
use crate::refresh::{RefreshOutcome, Refresher};
use aggregator_storage::{now_ms, StorageService};
use aggregator_types::{
	to_raw_amount, AssetRecord, LiquiditySource, PathTable, RouteCandidate, RouteQuery,
	RouteRequest, SourceError, SourceOptions, SwapTransaction,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Everything needed to construct an instance for one source.
#[derive(Clone)]
pub struct InstanceConfig {
	pub source: Arc<dyn LiquiditySource>,
	pub options: SourceOptions,
	/// Storage for this source's caches. `None` uses the registry default.
	pub storage: Option<Arc<StorageService>>,
}

impl InstanceConfig {
	pub fn new(source: Arc<dyn LiquiditySource>, options: SourceOptions) -> Self {
		Self {
			source,
			options,
			storage: None,
		}
	}

	pub fn with_storage(mut self, storage: Arc<StorageService>) -> Self {
		self.storage = Some(storage);
		self
	}
}

pub struct SourceInstance {
	name: String,
	source: Arc<dyn LiquiditySource>,
	options: SourceOptions,
	cache: Arc<SourceCache>,
	refresher: Arc<Refresher>,
	shutdown_tx: broadcast::Sender<()>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
	closed: AtomicBool,
}

impl SourceInstance {
	/// Builds an instance and runs its initialization.
	///
	/// Initialization hydrates from storage, runs one refresh attempt and
	/// starts the interval loop when enabled. With lazy loading the caller
	/// gets the instance right after hydration and the refresh continues
	/// in the background; otherwise this waits until the first attempt
	/// completes, fails or times out.
	pub async fn create(
		config: InstanceConfig,
		default_storage: Arc<StorageService>,
		events: EventBus,
	) -> Arc<Self> {
		let InstanceConfig {
			source,
			options,
			storage,
		} = config;
		let storage = storage.unwrap_or(default_storage);
		let cache = Arc::new(SourceCache::new());
		let refresher = Arc::new(Refresher::new(
			Arc::clone(&source),
			Arc::clone(&cache),
			Arc::clone(&storage),
			events,
			options
				.cache
				.max_caches_update_time_ms
				.map(Duration::from_millis),
		));
		let (shutdown_tx, _) = broadcast::channel(1);

		let instance = Arc::new(Self {
			name: source.name().to_string(),
			source,
			options,
			cache,
			refresher,
			shutdown_tx,
			tasks: Mutex::new(Vec::new()),
			closed: AtomicBool::new(false),
		});

		debug!("[{}] Instance initiating", instance.name);
		instance.hydrate_from(&storage).await;

		let force = instance.options.cache.force_initial_update;
		if instance.options.lazy_loading {
			let refresher = Arc::clone(&instance.refresher);
			let initial = tokio::spawn(async move {
				refresher.refresh(force).await;
			});
			instance.tasks.lock().await.push(initial);
		} else {
			instance.refresher.refresh(force).await;
		}

		if instance.options.cache.update_intervally && instance.options.cache.update_interval_ms > 0 {
			let period = Duration::from_millis(instance.options.cache.update_interval_ms);
			let loop_task = tokio::spawn(
				Arc::clone(&instance.refresher).run_interval(period, instance.shutdown_tx.subscribe()),
			);
			instance.tasks.lock().await.push(loop_task);
		}

		info!("[{}] Instance ready (lazy: {})", instance.name, instance.options.lazy_loading);
		instance
	}

	/// Fills the cache from storage. A forced initial update accepts any
	/// age, since a live refresh follows immediately.
	async fn hydrate_from(&self, storage: &StorageService) {
		let cache_options = &self.options.cache;
		if !cache_options.init_cache_from_storage {
			debug!("[{}] Skipping cache hydration", self.name);
			return;
		}

		let window_ms = if cache_options.force_initial_update {
			u64::MAX
		} else {
			cache_options.update_interval_ms
		};
		let with_paths = self.source.capabilities().supports_path_enumeration;

		match hydrate(storage, &self.name, window_ms, with_paths, now_ms()).await {
			Ok(Some(snapshot)) => {
				if let Some(generation) = self.cache.begin_attempt() {
					self.cache.commit(generation, snapshot);
				}
			}
			Ok(None) => debug!("[{}] No usable caches in storage, cold start", self.name),
			Err(e) => error!("[{}] Cache hydration failed: {}", self.name, e),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn options(&self) -> &SourceOptions {
		&self.options
	}

	pub fn source(&self) -> &Arc<dyn LiquiditySource> {
		&self.source
	}

	pub fn snapshot(&self) -> Arc<CacheSnapshot> {
		self.cache.load()
	}

	pub fn is_ready(&self) -> bool {
		!self.cache.is_empty()
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Cached coins sorted by type.
	pub fn coins(&self) -> Vec<AssetRecord> {
		self.cache.load().coin_list()
	}

	/// Cached paths of a source that enumerates its pools.
	pub fn paths(&self) -> Result<PathTable, CoreError> {
		if !self.source.capabilities().supports_path_enumeration {
			return Err(SourceError::Unsupported(format!(
				"{} does not enumerate paths",
				self.name
			))
			.into());
		}
		Ok(self.cache.load().paths.clone().unwrap_or_default())
	}

	/// Forces a refresh attempt now, subject to the single-flight guard.
	pub async fn refresh_now(&self) -> RefreshOutcome {
		self.refresher.refresh(true).await
	}

	/// Quotes a request with this source.
	///
	/// The human-readable input amount is converted with the decimals this
	/// source has cached for the input coin. A coin missing from the cache
	/// fails before the source is called.
	pub async fn get_route_data(&self, request: &RouteRequest) -> Result<RouteCandidate, CoreError> {
		let decimals = self
			.cache
			.load()
			.coins
			.get(&request.token_from)
			.map(|record| record.decimals)
			.ok_or_else(|| SourceError::AssetNotFound(request.token_from.clone()))?;

		let query = RouteQuery {
			coin_type_from: request.token_from.clone(),
			coin_type_to: request.token_to.clone(),
			input_amount: request.amount,
			input_amount_raw: to_raw_amount(request.amount, decimals)?,
			slippage_percentage: request.slippage_percentage,
			signer_address: request.signer_address.clone(),
		};

		let route = self
			.source
			.get_route_data(&query)
			.await
			.map_err(|e| CoreError::from_source(&self.name, e))?;

		Ok(RouteCandidate {
			source_name: self.name.clone(),
			output_amount: route.output_amount,
			route_detail: route.route,
		})
	}

	/// Hands a route this source produced back to its transaction builder.
	pub async fn build_swap_transaction(
		&self,
		route: &serde_json::Value,
		signer_address: &str,
		slippage_percentage: Decimal,
	) -> Result<SwapTransaction, CoreError> {
		self.source
			.build_swap_transaction(route, signer_address, slippage_percentage)
			.await
			.map_err(|e| CoreError::from_source(&self.name, e))
	}

	/// Stops the interval loop and any background refresh, and closes the
	/// cache so a fetch still in flight cannot land. Pending storage writes
	/// are not flushed. Calling this more than once has no further effect.
	pub async fn shutdown(&self) {
		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}

		self.cache.close();
		let _ = self.shutdown_tx.send(());

		let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
		for task in tasks {
			task.abort();
			if let Err(e) = task.await {
				if !e.is_cancelled() {
					error!("[{}] Background task failed: {}", self.name, e);
				}
			}
		}

		info!("[{}] Instance removed", self.name);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{MockSource, SUI, USDC};
	use aggregator_storage::{MemoryStorage, StorageInterface};
	use aggregator_types::{CacheEnvelope, CacheOptions, StorageProperty};

	fn options(lazy: bool) -> SourceOptions {
		SourceOptions::new(CacheOptions::new(60_000).with_update_intervally(false))
			.with_lazy_loading(lazy)
	}

	fn request(from: &str, amount: Decimal) -> RouteRequest {
		RouteRequest {
			token_from: from.to_string(),
			token_to: USDC.to_string(),
			amount,
			slippage_percentage: Decimal::ONE,
			signer_address: "0xsigner".to_string(),
		}
	}

	async fn create(source: Arc<MockSource>, options: SourceOptions) -> (Arc<SourceInstance>, Arc<StorageService>) {
		let storage = Arc::new(StorageService::in_memory());
		let instance = SourceInstance::create(
			InstanceConfig::new(source, options).with_storage(storage.clone()),
			Arc::new(StorageService::in_memory()),
			EventBus::default(),
		)
		.await;
		(instance, storage)
	}

	#[tokio::test]
	async fn test_eager_instance_is_ready_on_return() {
		let source = Arc::new(MockSource::new("Flowx"));
		let (instance, storage) = create(source.clone(), options(false)).await;

		assert!(instance.is_ready());
		assert_eq!(instance.coins().len(), 2);
		assert_eq!(source.fetch_count(), 1);
		assert!(storage
			.get_cache("Flowx", StorageProperty::CoinsCache)
			.await
			.unwrap()
			.is_some());
		instance.shutdown().await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_lazy_instance_returns_before_refresh() {
		let source = Arc::new(MockSource::new("Flowx").with_fetch_delay(Duration::from_secs(3)));
		let (instance, _) = create(source.clone(), options(true)).await;
		assert!(!instance.is_ready());

		tokio::time::sleep(Duration::from_secs(5)).await;
		assert!(instance.is_ready());
		instance.shutdown().await;
	}

	#[tokio::test]
	async fn test_fresh_storage_avoids_live_fetch() {
		let storage = Arc::new(StorageService::in_memory());
		let seed = Arc::new(MockSource::new("Flowx"));
		let first = SourceInstance::create(
			InstanceConfig::new(seed, options(false)).with_storage(storage.clone()),
			Arc::new(StorageService::in_memory()),
			EventBus::default(),
		)
		.await;
		first.shutdown().await;

		let source = Arc::new(MockSource::new("Flowx"));
		let second = SourceInstance::create(
			InstanceConfig::new(source.clone(), options(false)).with_storage(storage.clone()),
			Arc::new(StorageService::in_memory()),
			EventBus::default(),
		)
		.await;
		assert!(second.is_ready());
		assert_eq!(source.fetch_count(), 0);
		second.shutdown().await;

		// A forced initial update always goes to the source
		let forced = Arc::new(MockSource::new("Flowx"));
		let mut forced_options = options(false);
		forced_options.cache.force_initial_update = true;
		let third = SourceInstance::create(
			InstanceConfig::new(forced.clone(), forced_options).with_storage(storage),
			Arc::new(StorageService::in_memory()),
			EventBus::default(),
		)
		.await;
		assert_eq!(forced.fetch_count(), 1);
		third.shutdown().await;
	}

	#[tokio::test]
	async fn test_corrupt_storage_falls_back_to_cold_start() {
		let backend = MemoryStorage::new();
		let envelope = CacheEnvelope::new(serde_json::json!({ "not": "a list" }), now_ms());
		backend
			.set_bytes("Flowx:coinsCache", serde_json::to_vec(&envelope).unwrap())
			.await
			.unwrap();
		let storage = Arc::new(StorageService::new(Box::new(backend)));

		let source = Arc::new(MockSource::new("Flowx"));
		let instance = SourceInstance::create(
			InstanceConfig::new(source.clone(), options(false)).with_storage(storage.clone()),
			Arc::new(StorageService::in_memory()),
			EventBus::default(),
		)
		.await;

		assert!(instance.is_ready());
		assert_eq!(source.fetch_count(), 1);

		// The live result replaces the corrupt entry
		let stored = storage
			.get_cache("Flowx", StorageProperty::CoinsCache)
			.await
			.unwrap()
			.unwrap();
		assert!(stored.value.is_array());
		instance.shutdown().await;
	}

	#[tokio::test]
	async fn test_skip_storage_hydration() {
		let storage = Arc::new(StorageService::in_memory());
		let seed = SourceInstance::create(
			InstanceConfig::new(Arc::new(MockSource::new("Flowx")), options(false))
				.with_storage(storage.clone()),
			Arc::new(StorageService::in_memory()),
			EventBus::default(),
		)
		.await;
		seed.shutdown().await;

		let source = Arc::new(MockSource::new("Flowx"));
		let mut no_hydration = options(false);
		no_hydration.cache.init_cache_from_storage = false;
		let instance = SourceInstance::create(
			InstanceConfig::new(source.clone(), no_hydration).with_storage(storage),
			Arc::new(StorageService::in_memory()),
			EventBus::default(),
		)
		.await;
		assert_eq!(source.fetch_count(), 1);
		instance.shutdown().await;
	}

	#[tokio::test]
	async fn test_route_data_converts_with_cached_decimals() {
		let source = Arc::new(MockSource::new("Flowx").with_output(42));
		let (instance, _) = create(source.clone(), options(false)).await;

		let candidate = instance
			.get_route_data(&request(SUI, Decimal::new(15, 1)))
			.await
			.unwrap();
		assert_eq!(candidate.source_name, "Flowx");
		assert_eq!(candidate.output_amount, 42);

		let query = source.last_query.lock().unwrap().clone().unwrap();
		assert_eq!(query.input_amount_raw, 1_500_000_000);
		assert_eq!(query.coin_type_to, USDC);
		instance.shutdown().await;
	}

	#[tokio::test]
	async fn test_unknown_coin_fails_before_quoting() {
		let source = Arc::new(MockSource::new("Flowx"));
		let (instance, _) = create(source.clone(), options(false)).await;

		let result = instance
			.get_route_data(&request("0xdead::x::X", Decimal::ONE))
			.await;
		match result {
			Err(CoreError::Source(SourceError::AssetNotFound(coin))) => {
				assert_eq!(coin, "0xdead::x::X")
			}
			other => panic!("unexpected result: {:?}", other.map(|c| c.source_name)),
		}
		assert_eq!(source.quotes.load(Ordering::SeqCst), 0);
		instance.shutdown().await;
	}

	#[tokio::test]
	async fn test_paths_require_capability() {
		let (instance, _) = create(Arc::new(MockSource::new("Flowx")), options(false)).await;
		assert!(matches!(
			instance.paths(),
			Err(CoreError::Source(SourceError::Unsupported(_)))
		));
		instance.shutdown().await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_shutdown_is_idempotent_and_stops_refreshes() {
		let source = Arc::new(MockSource::new("Flowx").with_fetch_delay(Duration::from_secs(1)));
		let opts = SourceOptions::new(CacheOptions::new(10_000)).with_lazy_loading(true);
		let (instance, _) = create(source.clone(), opts).await;

		// Teardown while the lazy initial refresh is still in flight
		instance.shutdown().await;
		instance.shutdown().await;
		assert!(instance.is_closed());

		tokio::time::sleep(Duration::from_secs(60)).await;
		assert!(!instance.is_ready());
		assert!(source.fetch_count() <= 1);
		assert_eq!(instance.refresh_now().await, RefreshOutcome::Discarded);
	}
}
