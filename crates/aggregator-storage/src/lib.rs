//! Storage module for the route aggregator.
//!
//! This module provides the persistence layer behind source caches. A
//! low-level byte backend ([`StorageInterface`]) is wrapped by
//! [`StorageService`], which stores every cached property of a source as a
//! timestamped envelope keyed by `(source, property)`. Backends are
//! interchangeable; persistence is best-effort and callers keep working from
//! memory when it fails.

use aggregator_types::{CacheEnvelope, StorageProperty};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub mod freshness;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use freshness::{is_fresh, now_ms, read_fresh, CacheRead};
pub use implementations::{file::FileStorage, memory::MemoryStorage};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// A stored entry exists but does not have the expected shape.
	#[error("Corrupt cache entry {key}: {reason}")]
	Corrupt { key: String, reason: String },
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// This trait must be implemented by any storage backend that wants to
/// hold source caches. It provides basic key-value operations; ordering of
/// concurrent writers to the same key is up to the backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes under the given key.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// Cache storage service that stores timestamped envelopes.
///
/// The StorageService wraps a low-level storage backend and implements the
/// cache contract on top of it: values are serialized to JSON, wrapped in a
/// [`CacheEnvelope`] stamped with the write time, and stored under
/// `"{source}:{property}"`.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Creates a StorageService backed by a fresh process-local map.
	pub fn in_memory() -> Self {
		Self::new(Box::new(MemoryStorage::new()))
	}

	/// Key under which a source property is stored.
	pub fn cache_key(source: &str, property: StorageProperty) -> String {
		format!("{}:{}", source, property.as_str())
	}

	/// Reads the envelope stored for a source property.
	///
	/// Returns `Ok(None)` when nothing is stored and
	/// `StorageError::Serialization` when the stored bytes are not an
	/// envelope.
	pub async fn get_cache(
		&self,
		source: &str,
		property: StorageProperty,
	) -> Result<Option<CacheEnvelope>, StorageError> {
		let key = Self::cache_key(source, property);
		match self.backend.get_bytes(&key).await {
			Ok(bytes) => serde_json::from_slice(&bytes)
				.map(Some)
				.map_err(|e| StorageError::Serialization(e.to_string())),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Stores a serializable value for a source property, stamped with the
	/// current time.
	pub async fn set_cache<T: Serialize + ?Sized>(
		&self,
		source: &str,
		property: StorageProperty,
		value: &T,
	) -> Result<(), StorageError> {
		let value =
			serde_json::to_value(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.set_envelope(source, property, &CacheEnvelope::new(value, now_ms()))
			.await
	}

	/// Stores an already built envelope as is.
	pub async fn set_envelope(
		&self,
		source: &str,
		property: StorageProperty,
		envelope: &CacheEnvelope,
	) -> Result<(), StorageError> {
		let key = Self::cache_key(source, property);
		let bytes =
			serde_json::to_vec(envelope).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes).await
	}

	/// Removes a source property from storage.
	pub async fn remove_cache(
		&self,
		source: &str,
		property: StorageProperty,
	) -> Result<(), StorageError> {
		let key = Self::cache_key(source, property);
		self.backend.delete(&key).await
	}
}

/// Storage backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageBackend {
	/// In-memory storage (lost on restart)
	#[default]
	Memory,
	/// File-based storage (persisted)
	File { path: PathBuf },
}

/// Creates a storage service for the configured backend.
pub fn create_storage(backend: &StorageBackend) -> StorageService {
	match backend {
		StorageBackend::Memory => StorageService::in_memory(),
		StorageBackend::File { path } => {
			StorageService::new(Box::new(FileStorage::new(path.clone())))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use aggregator_types::AssetRecord;

	#[tokio::test]
	async fn test_set_and_get_cache_envelope() {
		let storage = StorageService::in_memory();
		let coins = vec![AssetRecord::new("0x2::sui::SUI", 9, None)];

		let before = now_ms();
		storage
			.set_cache("Flowx", StorageProperty::CoinsCache, &coins)
			.await
			.unwrap();

		let envelope = storage
			.get_cache("Flowx", StorageProperty::CoinsCache)
			.await
			.unwrap()
			.unwrap();
		assert!(envelope.timestamp_ms().unwrap() >= before);
		assert_eq!(envelope.value, serde_json::to_value(&coins).unwrap());

		// Properties and sources are independent keys
		assert!(storage
			.get_cache("Flowx", StorageProperty::CoinsMetadata)
			.await
			.unwrap()
			.is_none());
		assert!(storage
			.get_cache("Cetus", StorageProperty::CoinsCache)
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn test_get_cache_rejects_non_envelope_bytes() {
		let backend = MemoryStorage::new();
		backend
			.set_bytes("Flowx:coinsCache", b"not json".to_vec())
			.await
			.unwrap();
		let storage = StorageService::new(Box::new(backend));

		let result = storage.get_cache("Flowx", StorageProperty::CoinsCache).await;
		assert!(matches!(result, Err(StorageError::Serialization(_))));
	}

	#[test]
	fn test_storage_backend_from_config() {
		let backend: StorageBackend =
			from_json(r#"{ "backend": "file", "path": "./data/cache" }"#);
		assert_eq!(
			backend,
			StorageBackend::File {
				path: PathBuf::from("./data/cache")
			}
		);
		assert_eq!(
			from_json::<StorageBackend>(r#"{ "backend": "memory" }"#),
			StorageBackend::Memory
		);
	}

	fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> T {
		serde_json::from_str(json).unwrap()
	}
}
