//! Scriptable liquidity source shared by the unit tests of this crate.

use aggregator_storage::{StorageError, StorageInterface};
use aggregator_types::{
	AssetRecord, LiquiditySource, PathSource, PathTable, PoolPath, RouteQuery, SourceCapabilities,
	SourceError, SourceRoute, SourceSnapshot, SwapTransaction,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const SUI: &str = "0x2::sui::SUI";
pub const USDC: &str = "0xa::usdc::USDC";

pub struct MockSource {
	name: String,
	output: Option<u128>,
	delay: Duration,
	quote_delay: Duration,
	paths: Option<Vec<PoolPath>>,
	declares_paths: bool,
	fail_fetch: AtomicBool,
	pub fetches: AtomicUsize,
	pub quotes: AtomicUsize,
	pub quotes_finished: AtomicUsize,
	active: AtomicUsize,
	pub max_active: AtomicUsize,
	pub last_query: Mutex<Option<RouteQuery>>,
}

impl MockSource {
	pub fn new(name: &str) -> Self {
		Self {
			name: name.to_string(),
			output: Some(1_000),
			delay: Duration::ZERO,
			quote_delay: Duration::ZERO,
			paths: None,
			declares_paths: false,
			fail_fetch: AtomicBool::new(false),
			fetches: AtomicUsize::new(0),
			quotes: AtomicUsize::new(0),
			quotes_finished: AtomicUsize::new(0),
			active: AtomicUsize::new(0),
			max_active: AtomicUsize::new(0),
			last_query: Mutex::new(None),
		}
	}

	pub fn with_output(mut self, output: u128) -> Self {
		self.output = Some(output);
		self
	}

	pub fn failing_quotes(mut self) -> Self {
		self.output = None;
		self
	}

	pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	pub fn with_quote_delay(mut self, delay: Duration) -> Self {
		self.quote_delay = delay;
		self
	}

	pub fn with_paths(mut self, paths: Vec<PoolPath>) -> Self {
		self.paths = Some(paths);
		self.declares_paths = true;
		self
	}

	/// Declares path enumeration without providing the interface.
	pub fn declaring_paths_only(mut self) -> Self {
		self.declares_paths = true;
		self
	}

	pub fn set_fail_fetch(&self, fail: bool) {
		self.fail_fetch.store(fail, Ordering::SeqCst);
	}

	pub fn fetch_count(&self) -> usize {
		self.fetches.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl PathSource for MockSource {
	async fn fetch_paths(&self) -> Result<PathTable, SourceError> {
		Ok(self
			.paths
			.clone()
			.unwrap_or_default()
			.into_iter()
			.map(|path| (path.key(), path))
			.collect())
	}
}

#[async_trait]
impl LiquiditySource for MockSource {
	fn name(&self) -> &str {
		&self.name
	}

	fn capabilities(&self) -> SourceCapabilities {
		SourceCapabilities {
			supports_path_enumeration: self.declares_paths,
		}
	}

	fn as_path_source(&self) -> Option<&dyn PathSource> {
		self.paths.as_ref().map(|_| self as &dyn PathSource)
	}

	async fn fetch_snapshot(&self) -> Result<SourceSnapshot, SourceError> {
		let attempt = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
		let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_active.fetch_max(active, Ordering::SeqCst);

		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}
		self.active.fetch_sub(1, Ordering::SeqCst);

		if self.fail_fetch.load(Ordering::SeqCst) {
			return Err(SourceError::Unavailable("backend is down".to_string()));
		}

		// Every record carries the attempt number so tests can tell
		// generations apart
		let tag = Some(format!("attempt-{}", attempt));
		Ok(SourceSnapshot::from_coins(vec![
			AssetRecord::new(SUI, 9, tag.clone()),
			AssetRecord::new(USDC, 6, tag),
		]))
	}

	async fn get_route_data(&self, query: &RouteQuery) -> Result<SourceRoute, SourceError> {
		self.quotes.fetch_add(1, Ordering::SeqCst);
		if let Ok(mut last) = self.last_query.lock() {
			*last = Some(query.clone());
		}
		if !self.quote_delay.is_zero() {
			tokio::time::sleep(self.quote_delay).await;
		}
		self.quotes_finished.fetch_add(1, Ordering::SeqCst);

		let output = self
			.output
			.ok_or_else(|| SourceError::Unavailable("quote failed".to_string()))?;
		Ok(SourceRoute {
			output_amount: output,
			route: serde_json::json!({
				"source": self.name,
				"amountIn": query.input_amount_raw.to_string(),
			}),
		})
	}

	async fn build_swap_transaction(
		&self,
		route: &serde_json::Value,
		signer_address: &str,
		slippage_percentage: Decimal,
	) -> Result<SwapTransaction, SourceError> {
		Ok(SwapTransaction {
			source_name: self.name.clone(),
			payload: serde_json::json!({
				"route": route,
				"sender": signer_address,
				"slippage": slippage_percentage.to_string(),
			}),
		})
	}
}

/// Storage backend whose every operation fails.
pub struct UnavailableStorage;

#[async_trait]
impl StorageInterface for UnavailableStorage {
	async fn get_bytes(&self, _key: &str) -> Result<Vec<u8>, StorageError> {
		Err(StorageError::Backend("disk offline".to_string()))
	}

	async fn set_bytes(&self, _key: &str, _value: Vec<u8>) -> Result<(), StorageError> {
		Err(StorageError::Backend("disk offline".to_string()))
	}

	async fn delete(&self, _key: &str) -> Result<(), StorageError> {
		Err(StorageError::Backend("disk offline".to_string()))
	}

	async fn exists(&self, _key: &str) -> Result<bool, StorageError> {
		Err(StorageError::Backend("disk offline".to_string()))
	}
}
