//! Cross-source view of cached coins.

use crate::event_bus::CacheSubscriber;
use crate::instance::SourceInstance;
use aggregator_types::{AssetRecord, CacheEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Coin lists of all sources, kept current from cache events.
#[derive(Default)]
pub struct CoinManager {
	coins: DashMap<String, Arc<Vec<AssetRecord>>>,
}

impl CoinManager {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seeds the manager with what the given instances currently cache.
	pub fn from_instances(instances: &[Arc<SourceInstance>]) -> Self {
		let manager = Self::new();
		for instance in instances {
			manager
				.coins
				.insert(instance.name().to_string(), Arc::new(instance.coins()));
		}
		manager
	}

	/// Per-source coin lists ordered by source name.
	pub fn all_coins(&self) -> Vec<(String, Arc<Vec<AssetRecord>>)> {
		let mut all: Vec<_> = self
			.coins
			.iter()
			.map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
			.collect();
		all.sort_by(|a, b| a.0.cmp(&b.0));
		all
	}

	/// Record of `coin_type` from the first source, by name, that has it.
	pub fn find_coin(&self, coin_type: &str) -> Option<(String, AssetRecord)> {
		self.all_coins().into_iter().find_map(|(source_name, coins)| {
			coins
				.iter()
				.find(|record| record.coin_type == coin_type)
				.map(|record| (source_name, record.clone()))
		})
	}
}

#[async_trait]
impl CacheSubscriber for CoinManager {
	async fn on_event(&self, event: &CacheEvent) {
		match event {
			CacheEvent::CachesUpdated {
				source_name,
				coins,
				generation,
			} => {
				debug!(
					"[{}] Coin list updated to generation {} ({} coins)",
					source_name,
					generation,
					coins.len()
				);
				self.coins.insert(source_name.clone(), Arc::clone(coins));
			}
		}
	}
}
