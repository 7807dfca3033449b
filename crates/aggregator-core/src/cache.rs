//! Per-source in-memory cache and its hydration from storage.
//!
//! The cache is a single [`CacheSnapshot`] behind an [`ArcSwap`]. Readers
//! take a whole snapshot and keep it for as long as they need; writers only
//! ever install a new snapshot, so a reader never observes a table that
//! mixes two refresh generations.

use crate::error::CoreError;
use aggregator_storage::{read_fresh, CacheRead, StorageService};
use aggregator_types::{
	AssetRecord, CoinMetadata, CoinTable, PathTable, SourceSnapshot, StorageProperty,
};
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Immutable view of a source's cached asset universe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
	/// Attempt that produced this snapshot, 0 for the initial empty cache.
	pub generation: u64,
	pub coins: CoinTable,
	pub metadata: Vec<CoinMetadata>,
	pub paths: Option<PathTable>,
}

impl CacheSnapshot {
	pub fn from_source(snapshot: SourceSnapshot) -> Self {
		Self {
			generation: 0,
			coins: CoinTable::from_records(snapshot.coins),
			metadata: snapshot.metadata,
			paths: snapshot.paths,
		}
	}

	/// A cache is empty while either the coin table or the metadata list is.
	pub fn is_empty(&self) -> bool {
		self.coins.is_empty() || self.metadata.is_empty()
	}

	pub fn coin_list(&self) -> Vec<AssetRecord> {
		self.coins.to_sorted_vec()
	}
}

#[derive(Debug, Default)]
struct Gate {
	generation: u64,
	closed: bool,
}

/// Holder of the current snapshot plus the generation gate that decides
/// which attempt may still install one.
pub struct SourceCache {
	current: ArcSwap<CacheSnapshot>,
	gate: Mutex<Gate>,
}

impl SourceCache {
	pub fn new() -> Self {
		Self {
			current: ArcSwap::from_pointee(CacheSnapshot::default()),
			gate: Mutex::new(Gate::default()),
		}
	}

	/// Current snapshot. Never blocks and never observes a partial update.
	pub fn load(&self) -> Arc<CacheSnapshot> {
		self.current.load_full()
	}

	pub fn is_empty(&self) -> bool {
		self.current.load().is_empty()
	}

	pub fn generation(&self) -> u64 {
		self.current.load().generation
	}

	/// Starts a new attempt and returns its generation, or `None` once the
	/// cache is closed. Starting an attempt invalidates every older one.
	pub fn begin_attempt(&self) -> Option<u64> {
		let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
		if gate.closed {
			return None;
		}
		gate.generation += 1;
		Some(gate.generation)
	}

	/// Installs `snapshot` if `generation` is still the latest attempt and
	/// the cache is open. Returns the installed snapshot.
	pub fn commit(&self, generation: u64, mut snapshot: CacheSnapshot) -> Option<Arc<CacheSnapshot>> {
		let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
		if gate.closed || gate.generation != generation {
			debug!(
				"Discarding result of attempt {} (latest {}, closed {})",
				generation, gate.generation, gate.closed
			);
			return None;
		}
		snapshot.generation = generation;
		let snapshot = Arc::new(snapshot);
		self.current.store(Arc::clone(&snapshot));
		Some(snapshot)
	}

	/// Closes the cache. Attempts still in flight can no longer commit.
	pub fn close(&self) {
		let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
		gate.closed = true;
		gate.generation += 1;
	}

	pub fn is_closed(&self) -> bool {
		self.gate.lock().unwrap_or_else(PoisonError::into_inner).closed
	}
}

impl Default for SourceCache {
	fn default() -> Self {
		Self::new()
	}
}

/// Reads a source's cache from storage.
///
/// Returns `Ok(None)` when a required property is missing or older than
/// `window_ms`, in which case the caller proceeds from a cold start. The
/// paths property is required only when `with_paths` is set. A stored
/// property with the wrong shape is [`CoreError::CorruptCache`].
pub async fn hydrate(
	storage: &StorageService,
	source_name: &str,
	window_ms: u64,
	with_paths: bool,
	now_ms: i64,
) -> Result<Option<CacheSnapshot>, CoreError> {
	let coins: CacheRead<Vec<AssetRecord>> =
		read_fresh(storage, source_name, StorageProperty::CoinsCache, window_ms, now_ms).await?;
	let metadata: CacheRead<Vec<CoinMetadata>> = read_fresh(
		storage,
		source_name,
		StorageProperty::CoinsMetadata,
		window_ms,
		now_ms,
	)
	.await?;

	let (Some(coins), Some(metadata)) = (coins.into_fresh(), metadata.into_fresh()) else {
		return Ok(None);
	};

	let paths = if with_paths {
		let paths: CacheRead<PathTable> =
			read_fresh(storage, source_name, StorageProperty::PathsCache, window_ms, now_ms)
				.await?;
		match paths.into_fresh() {
			Some(paths) => Some(paths),
			None => return Ok(None),
		}
	} else {
		None
	};

	let snapshot = CacheSnapshot {
		generation: 0,
		coins: CoinTable::from_records(coins),
		metadata,
		paths,
	};
	if snapshot.is_empty() {
		return Ok(None);
	}

	info!(
		"[{}] Hydrated {} coins from storage",
		source_name,
		snapshot.coins.len()
	);
	Ok(Some(snapshot))
}

/// Writes a committed snapshot back to storage. Failures are logged and
/// otherwise ignored; the in-memory cache stays authoritative.
pub async fn store_snapshot(storage: &StorageService, source_name: &str, snapshot: &CacheSnapshot) {
	let coins = snapshot.coin_list();
	if let Err(e) = storage
		.set_cache(source_name, StorageProperty::CoinsCache, &coins)
		.await
	{
		warn!("[{}] Failed to store coins cache: {}", source_name, e);
	}
	if let Err(e) = storage
		.set_cache(source_name, StorageProperty::CoinsMetadata, &snapshot.metadata)
		.await
	{
		warn!("[{}] Failed to store coins metadata cache: {}", source_name, e);
	}
	if let Some(paths) = &snapshot.paths {
		if let Err(e) = storage
			.set_cache(source_name, StorageProperty::PathsCache, paths)
			.await
		{
			warn!("[{}] Failed to store paths cache: {}", source_name, e);
		}
	}
}
