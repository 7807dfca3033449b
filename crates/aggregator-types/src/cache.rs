//! Persisted cache envelope and per-source cache options.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Property of a source cache stored independently in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageProperty {
	CoinsCache,
	CoinsMetadata,
	PathsCache,
}

impl StorageProperty {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::CoinsCache => "coinsCache",
			Self::CoinsMetadata => "coinsMetadataCache",
			Self::PathsCache => "pathsCache",
		}
	}
}

impl fmt::Display for StorageProperty {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Persisted form of a cached value.
///
/// `timestamp` is the write time in epoch milliseconds, kept as a string on
/// the wire. A reader must never use `value` without checking the timestamp
/// against its freshness window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
	pub value: serde_json::Value,
	pub timestamp: String,
}

impl CacheEnvelope {
	pub fn new(value: serde_json::Value, timestamp_ms: i64) -> Self {
		Self {
			value,
			timestamp: timestamp_ms.to_string(),
		}
	}

	/// Parses the write timestamp, `None` when it is not an integer.
	pub fn timestamp_ms(&self) -> Option<i64> {
		self.timestamp.trim().parse().ok()
	}
}

/// Cache behaviour of one source instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheOptions {
	/// Recurring refresh period, also the freshness window for hydration.
	pub update_interval_ms: u64,
	/// Enables the recurring refresh loop.
	#[serde(default = "default_true")]
	pub update_intervally: bool,
	/// Always refresh live on first hydration.
	#[serde(default)]
	pub force_initial_update: bool,
	/// Skips hydration from storage entirely when false.
	#[serde(default = "default_true")]
	pub init_cache_from_storage: bool,
	/// Upper bound of a single live refresh attempt.
	#[serde(default)]
	pub max_caches_update_time_ms: Option<u64>,
}

impl CacheOptions {
	pub fn new(update_interval_ms: u64) -> Self {
		Self {
			update_interval_ms,
			update_intervally: true,
			force_initial_update: false,
			init_cache_from_storage: true,
			max_caches_update_time_ms: None,
		}
	}

	pub fn with_update_intervally(mut self, enabled: bool) -> Self {
		self.update_intervally = enabled;
		self
	}

	pub fn with_force_initial_update(mut self, force: bool) -> Self {
		self.force_initial_update = force;
		self
	}

	pub fn with_init_cache_from_storage(mut self, enabled: bool) -> Self {
		self.init_cache_from_storage = enabled;
		self
	}

	pub fn with_max_update_time_ms(mut self, max_ms: u64) -> Self {
		self.max_caches_update_time_ms = Some(max_ms);
		self
	}
}

/// Options used when a source instance is first created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOptions {
	pub cache: CacheOptions,
	/// `false` blocks the caller until the first refresh attempt settles.
	#[serde(default = "default_true")]
	pub lazy_loading: bool,
}

impl SourceOptions {
	pub fn new(cache: CacheOptions) -> Self {
		Self {
			cache,
			lazy_loading: true,
		}
	}

	pub fn with_lazy_loading(mut self, lazy: bool) -> Self {
		self.lazy_loading = lazy;
		self
	}
}

fn default_true() -> bool {
	true
}
