//! In-memory storage implementation.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Process-local storage backend.
///
/// Used when a source is configured without an explicit store. Clones share
/// the same map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
	data: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.data
			.get(key)
			.map(|entry| entry.value().clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.data.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.data.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.data.contains_key(key))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_memory_storage() {
		let storage = MemoryStorage::new();

		assert!(matches!(
			storage.get_bytes("Cetus:coinsCache").await,
			Err(StorageError::NotFound)
		));

		storage
			.set_bytes("Cetus:coinsCache", vec![1, 2, 3])
			.await
			.unwrap();
		assert!(storage.exists("Cetus:coinsCache").await.unwrap());

		// Last write wins
		let shared = storage.clone();
		shared
			.set_bytes("Cetus:coinsCache", vec![4])
			.await
			.unwrap();
		assert_eq!(storage.get_bytes("Cetus:coinsCache").await.unwrap(), vec![4]);

		storage.delete("Cetus:coinsCache").await.unwrap();
		assert!(storage.is_empty());
		// Deleting again is not an error
		storage.delete("Cetus:coinsCache").await.unwrap();
	}
}
