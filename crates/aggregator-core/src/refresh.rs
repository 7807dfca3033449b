//! Bounded, single-flight refresh of a source cache.
//!
//! One [`Refresher`] drives all live updates of one source: the initial
//! refresh after hydration, manual refreshes and the recurring interval
//! loop. At most one attempt is in flight at any time; an attempt that
//! finds another one running returns immediately.

use crate::cache::{store_snapshot, CacheSnapshot, SourceCache};
use crate::event_bus::EventBus;
use aggregator_storage::StorageService;
use aggregator_types::{CacheEvent, LiquiditySource, SourceError, SourceSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Result of one refresh attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
	/// The cache is populated and no refresh was forced.
	Skipped,
	/// Another attempt is still in flight.
	AlreadyRunning,
	/// The cache was replaced with the result of this attempt.
	Updated { generation: u64, coins: usize },
	/// The fetch exceeded the configured bound and was abandoned.
	TimedOut { after_ms: u64 },
	/// The fetch failed; the previous cache is kept.
	Failed(SourceError),
	/// The fetch finished after the cache was closed or superseded.
	Discarded,
}

/// Clears the in-flight flag when an attempt ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
	fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
		flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.ok()
			.map(|_| Self(flag))
	}
}

impl Drop for InFlightGuard<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

pub struct Refresher {
	source: Arc<dyn LiquiditySource>,
	cache: Arc<SourceCache>,
	storage: Arc<StorageService>,
	events: EventBus,
	max_update_time: Option<Duration>,
	in_flight: AtomicBool,
}

impl Refresher {
	pub fn new(
		source: Arc<dyn LiquiditySource>,
		cache: Arc<SourceCache>,
		storage: Arc<StorageService>,
		events: EventBus,
		max_update_time: Option<Duration>,
	) -> Self {
		Self {
			source,
			cache,
			storage,
			events,
			max_update_time,
			in_flight: AtomicBool::new(false),
		}
	}

	pub fn is_refreshing(&self) -> bool {
		self.in_flight.load(Ordering::Acquire)
	}

	/// Runs one refresh attempt.
	///
	/// Without `force` the attempt only fetches when the cache is empty.
	/// The fetch runs as its own task raced against the configured bound;
	/// when the bound wins the task is left to finish on its own and its
	/// result is dropped.
	pub async fn refresh(&self, force: bool) -> RefreshOutcome {
		let name = self.source.name();

		if !force && !self.cache.is_empty() {
			debug!("[{}] Cache is populated, skipping update", name);
			return RefreshOutcome::Skipped;
		}

		let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight) else {
			debug!("[{}] Caches update already in progress", name);
			return RefreshOutcome::AlreadyRunning;
		};

		let Some(generation) = self.cache.begin_attempt() else {
			return RefreshOutcome::Discarded;
		};

		let source = Arc::clone(&self.source);
		let fetch = tokio::spawn(async move { fetch_all(source.as_ref()).await });

		let joined = match self.max_update_time {
			Some(limit) => match tokio::time::timeout(limit, fetch).await {
				Ok(joined) => joined,
				Err(_) => {
					let after_ms = limit.as_millis() as u64;
					error!("[{}] Caches update timed out after {}ms", name, after_ms);
					return RefreshOutcome::TimedOut { after_ms };
				}
			},
			None => fetch.await,
		};

		let snapshot = match joined {
			Ok(Ok(snapshot)) => snapshot,
			Ok(Err(e)) => {
				error!("[{}] Caches update failed: {}", name, e);
				return RefreshOutcome::Failed(e);
			}
			Err(e) => {
				error!("[{}] Caches update task failed: {}", name, e);
				return RefreshOutcome::Failed(SourceError::Unavailable(e.to_string()));
			}
		};

		let Some(committed) = self
			.cache
			.commit(generation, CacheSnapshot::from_source(snapshot))
		else {
			return RefreshOutcome::Discarded;
		};

		store_snapshot(&self.storage, name, &committed).await;

		let coins = committed.coin_list();
		let count = coins.len();
		self.events.publish(CacheEvent::CachesUpdated {
			source_name: name.to_string(),
			generation,
			coins: Arc::new(coins),
		});

		info!("[{}] Caches are updated and stored ({} coins)", name, count);
		RefreshOutcome::Updated {
			generation,
			coins: count,
		}
	}

	/// Handler of one interval tick: a forced refresh, dropped when an
	/// attempt is still running.
	pub async fn on_tick(&self) -> RefreshOutcome {
		self.refresh(true).await
	}

	/// Recurring refresh loop. The first tick fires one period after start.
	pub async fn run_interval(self: Arc<Self>, period: Duration, mut shutdown: broadcast::Receiver<()>) {
		let mut ticker = interval_at(Instant::now() + period, period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				_ = ticker.tick() => {
					let outcome = self.on_tick().await;
					debug!("[{}] Interval update: {:?}", self.source.name(), outcome);
				}
				_ = shutdown.recv() => {
					info!("[{}] Stopping caches update loop", self.source.name());
					break;
				}
			}
		}
	}
}

/// Fetches everything a source exposes, including paths when the source
/// declares path enumeration.
async fn fetch_all(source: &dyn LiquiditySource) -> Result<SourceSnapshot, SourceError> {
	let mut snapshot = source.fetch_snapshot().await?;

	if source.capabilities().supports_path_enumeration {
		let paths = source.as_path_source().ok_or_else(|| {
			SourceError::Unsupported(format!(
				"{} declares path enumeration without a path source",
				source.name()
			))
		})?;
		snapshot.paths = Some(paths.fetch_paths().await?);
	}

	if snapshot.coins.is_empty() {
		warn!("[{}] Fetched an empty coin list", source.name());
	}
	Ok(snapshot)
}
