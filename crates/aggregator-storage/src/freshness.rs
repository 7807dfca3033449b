//! Staleness checks for stored cache envelopes.

use crate::{StorageError, StorageService};
use aggregator_types::StorageProperty;
use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Current time in epoch milliseconds.
pub fn now_ms() -> i64 {
	Utc::now().timestamp_millis()
}

/// An envelope written at `timestamp_ms` is fresh iff
/// `timestamp_ms + window_ms > now_ms`. The boundary itself is stale.
pub fn is_fresh(timestamp_ms: i64, window_ms: u64, now_ms: i64) -> bool {
	let window_ms = i64::try_from(window_ms).unwrap_or(i64::MAX);
	timestamp_ms.saturating_add(window_ms) > now_ms
}

/// Outcome of reading one cached property.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead<T> {
	/// Nothing usable is stored, or the backend could not be read.
	Missing,
	/// A well-formed value exists but is older than the window.
	Stale { age_ms: i64 },
	Fresh(T),
}

impl<T> CacheRead<T> {
	pub fn into_fresh(self) -> Option<T> {
		match self {
			Self::Fresh(value) => Some(value),
			_ => None,
		}
	}
}

/// Reads a property and checks it against the freshness window.
///
/// Backend failures degrade to [`CacheRead::Missing`]. An envelope whose
/// timestamp or value does not have the expected shape is reported as
/// [`StorageError::Corrupt`], since that points at a schema mismatch rather
/// than an ordinary cold start.
pub async fn read_fresh<T: DeserializeOwned>(
	storage: &StorageService,
	source: &str,
	property: StorageProperty,
	window_ms: u64,
	now_ms: i64,
) -> Result<CacheRead<T>, StorageError> {
	let key = StorageService::cache_key(source, property);

	let envelope = match storage.get_cache(source, property).await {
		Ok(Some(envelope)) => envelope,
		Ok(None) => {
			warn!("[{}] Received empty {} from storage", source, property);
			return Ok(CacheRead::Missing);
		}
		Err(StorageError::Serialization(reason)) => {
			return Err(StorageError::Corrupt { key, reason });
		}
		Err(e) => {
			warn!("[{}] Failed to read {} from storage: {}", source, property, e);
			return Ok(CacheRead::Missing);
		}
	};

	let timestamp_ms = envelope.timestamp_ms().ok_or_else(|| StorageError::Corrupt {
		key: key.clone(),
		reason: format!("timestamp is not epoch milliseconds: {}", envelope.timestamp),
	})?;

	let value: T = serde_json::from_value(envelope.value).map_err(|e| StorageError::Corrupt {
		key: key.clone(),
		reason: e.to_string(),
	})?;

	if is_fresh(timestamp_ms, window_ms, now_ms) {
		debug!("[{}] {} from storage is up to date", source, property);
		Ok(CacheRead::Fresh(value))
	} else {
		warn!("[{}] {} from storage is not up to date", source, property);
		Ok(CacheRead::Stale {
			age_ms: now_ms.saturating_sub(timestamp_ms),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{MemoryStorage, StorageInterface};
	use aggregator_types::{CacheEnvelope, CoinMetadata};

	#[test]
	fn test_is_fresh_boundary_is_stale() {
		assert!(is_fresh(1_000, 500, 1_499));
		assert!(!is_fresh(1_000, 500, 1_500));
		assert!(!is_fresh(1_000, 500, 2_000));
		assert!(!is_fresh(1_000, 0, 1_000));
	}

	#[test]
	fn test_is_fresh_saturates_on_huge_window() {
		assert!(is_fresh(i64::MAX - 10, u64::MAX, i64::MAX - 1));
	}

	fn metadata() -> Vec<CoinMetadata> {
		vec![CoinMetadata {
			coin_type: "0x2::sui::SUI".to_string(),
			decimals: 9,
		}]
	}

	async fn storage_with(envelope: CacheEnvelope) -> StorageService {
		let storage = StorageService::in_memory();
		storage
			.set_envelope("Flowx", StorageProperty::CoinsMetadata, &envelope)
			.await
			.unwrap();
		storage
	}

	#[tokio::test]
	async fn test_read_fresh_and_stale() {
		let value = serde_json::to_value(metadata()).unwrap();
		let storage = storage_with(CacheEnvelope::new(value, 10_000)).await;

		let fresh: CacheRead<Vec<CoinMetadata>> =
			read_fresh(&storage, "Flowx", StorageProperty::CoinsMetadata, 1_000, 10_999)
				.await
				.unwrap();
		assert_eq!(fresh, CacheRead::Fresh(metadata()));

		let stale: CacheRead<Vec<CoinMetadata>> =
			read_fresh(&storage, "Flowx", StorageProperty::CoinsMetadata, 1_000, 11_000)
				.await
				.unwrap();
		assert_eq!(stale, CacheRead::Stale { age_ms: 1_000 });
	}

	#[tokio::test]
	async fn test_read_fresh_missing() {
		let storage = StorageService::in_memory();
		let read: CacheRead<Vec<CoinMetadata>> =
			read_fresh(&storage, "Flowx", StorageProperty::CoinsMetadata, 1_000, 0)
				.await
				.unwrap();
		assert_eq!(read, CacheRead::Missing);
	}

	#[tokio::test]
	async fn test_read_fresh_wrong_shape_is_corrupt() {
		let storage = storage_with(CacheEnvelope::new(
			serde_json::json!([{ "coinType": 42 }]),
			10_000,
		))
		.await;

		let result: Result<CacheRead<Vec<CoinMetadata>>, _> =
			read_fresh(&storage, "Flowx", StorageProperty::CoinsMetadata, 1_000, 10_001).await;
		assert!(matches!(result, Err(StorageError::Corrupt { .. })));

		let storage = storage_with(CacheEnvelope {
			value: serde_json::to_value(metadata()).unwrap(),
			timestamp: "soon".to_string(),
		})
		.await;
		let result: Result<CacheRead<Vec<CoinMetadata>>, _> =
			read_fresh(&storage, "Flowx", StorageProperty::CoinsMetadata, 1_000, 10_001).await;
		assert!(matches!(result, Err(StorageError::Corrupt { .. })));
	}

	#[tokio::test]
	async fn test_read_fresh_garbage_bytes_is_corrupt() {
		let backend = MemoryStorage::new();
		backend
			.set_bytes("Flowx:coinsMetadataCache", b"{\"value\":".to_vec())
			.await
			.unwrap();
		let storage = StorageService::new(Box::new(backend));

		let result: Result<CacheRead<Vec<CoinMetadata>>, _> =
			read_fresh(&storage, "Flowx", StorageProperty::CoinsMetadata, 1_000, 0).await;
		assert!(matches!(result, Err(StorageError::Corrupt { .. })));
	}
}
