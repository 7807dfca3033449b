//! Registry of live source instances.
//!
//! The registry is an explicit context object: callers construct one and
//! pass it wherever instances are needed. It holds at most one instance per
//! source name.

use crate::error::CoreError;
use crate::event_bus::EventBus;
use crate::instance::{InstanceConfig, SourceInstance};
use aggregator_storage::StorageService;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

type Slot = Arc<OnceCell<Arc<SourceInstance>>>;

pub struct SourceRegistry {
	instances: DashMap<String, Slot>,
	/// Storage used by instances configured without their own.
	storage: Arc<StorageService>,
	events: EventBus,
}

impl SourceRegistry {
	pub fn new(storage: Arc<StorageService>, events: EventBus) -> Self {
		Self {
			instances: DashMap::new(),
			storage,
			events,
		}
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	/// Returns the instance for `name`, creating it from `config` if none
	/// exists.
	///
	/// When an instance already exists it is returned unchanged and
	/// `config` is ignored. Creating a missing instance without a config,
	/// or with a config for another source, is [`CoreError::InstanceMisuse`].
	/// Concurrent first acquisitions of the same name create one instance.
	pub async fn acquire(
		&self,
		name: &str,
		config: Option<InstanceConfig>,
	) -> Result<Arc<SourceInstance>, CoreError> {
		if let Some(existing) = self.get(name) {
			if config.is_some() {
				debug!("[{}] Instance exists, ignoring new configuration", name);
			}
			return Ok(existing);
		}

		let slot: Slot = self
			.instances
			.entry(name.to_string())
			.or_insert_with(|| Arc::new(OnceCell::new()))
			.clone();

		let created = slot
			.get_or_try_init(|| async {
				let config = config.ok_or_else(|| {
					CoreError::InstanceMisuse(format!(
						"no instance of {} exists and no configuration was given",
						name
					))
				})?;
				if config.source.name() != name {
					return Err(CoreError::InstanceMisuse(format!(
						"configuration for {} passed when acquiring {}",
						config.source.name(),
						name
					)));
				}
				Ok(SourceInstance::create(config, Arc::clone(&self.storage), self.events.clone()).await)
			})
			.await
			.cloned();

		if created.is_err() {
			self.instances
				.remove_if(name, |_, current| Arc::ptr_eq(current, &slot) && current.get().is_none());
		}
		created
	}

	pub fn get(&self, name: &str) -> Option<Arc<SourceInstance>> {
		self.instances
			.get(name)
			.and_then(|slot| slot.get().cloned())
	}

	/// Live instances sorted by name.
	pub fn instances(&self) -> Vec<Arc<SourceInstance>> {
		let mut instances: Vec<_> = self
			.instances
			.iter()
			.filter_map(|slot| slot.value().get().cloned())
			.collect();
		instances.sort_by(|a, b| a.name().cmp(b.name()));
		instances
	}

	pub fn len(&self) -> usize {
		self.instances().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Removes and shuts down the instance for `name`. Returns whether an
	/// instance was removed; releasing an unknown name does nothing.
	///
	/// An instance still initializing is waited for and then shut down, so
	/// the pending acquisition receives a closed instance.
	pub async fn release(&self, name: &str) -> bool {
		let Some(slot) = self.instances.get(name).map(|entry| Arc::clone(entry.value())) else {
			return false;
		};

		let settled = slot
			.get_or_try_init(|| async { Err::<Arc<SourceInstance>, ()>(()) })
			.await
			.ok()
			.cloned();

		if self
			.instances
			.remove_if(name, |_, current| Arc::ptr_eq(current, &slot))
			.is_none()
		{
			return false;
		}

		match settled {
			Some(instance) => {
				instance.shutdown().await;
				true
			}
			None => {
				debug!("[{}] Released before any instance was created", name);
				false
			}
		}
	}

	pub async fn release_all(&self) {
		let names: Vec<String> = self.instances.iter().map(|slot| slot.key().clone()).collect();
		for name in names {
			self.release(&name).await;
		}
	}
}

impl Default for SourceRegistry {
	fn default() -> Self {
		Self::new(Arc::new(StorageService::in_memory()), EventBus::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::MockSource;
	use aggregator_types::{CacheOptions, SourceOptions, StorageProperty};
	use std::time::Duration;

	fn config(source: Arc<MockSource>, interval_ms: u64) -> InstanceConfig {
		InstanceConfig::new(
			source,
			SourceOptions::new(CacheOptions::new(interval_ms).with_update_intervally(false))
				.with_lazy_loading(false),
		)
	}

	#[tokio::test]
	async fn test_acquire_without_config_is_misuse() {
		let registry = SourceRegistry::default();
		let result = registry.acquire("Flowx", None).await;
		assert!(matches!(result, Err(CoreError::InstanceMisuse(_))));
		assert!(registry.is_empty());

		let mismatched = registry
			.acquire("Cetus", Some(config(Arc::new(MockSource::new("Flowx")), 1_000)))
			.await;
		assert!(matches!(mismatched, Err(CoreError::InstanceMisuse(_))));
		assert!(registry.get("Cetus").is_none());
	}

	#[tokio::test]
	async fn test_reuse_ignores_new_config() {
		let registry = SourceRegistry::default();
		let first_source = Arc::new(MockSource::new("Flowx"));
		let first = registry
			.acquire("Flowx", Some(config(first_source.clone(), 1_000)))
			.await
			.unwrap();

		let other_source = Arc::new(MockSource::new("Flowx"));
		let second = registry
			.acquire("Flowx", Some(config(other_source.clone(), 99_000)))
			.await
			.unwrap();

		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(second.options().cache.update_interval_ms, 1_000);
		assert_eq!(other_source.fetch_count(), 0);

		// Once created, no config is needed
		let third = registry.acquire("Flowx", None).await.unwrap();
		assert!(Arc::ptr_eq(&first, &third));
		registry.release_all().await;
	}

	#[tokio::test]
	async fn test_concurrent_acquire_creates_one_instance() {
		let registry = SourceRegistry::default();
		let source = Arc::new(MockSource::new("Flowx"));

		let (a, b) = tokio::join!(
			registry.acquire("Flowx", Some(config(source.clone(), 1_000))),
			registry.acquire("Flowx", Some(config(source.clone(), 1_000)))
		);

		assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
		assert_eq!(source.fetch_count(), 1);
		assert_eq!(registry.len(), 1);
		registry.release_all().await;
	}

	#[tokio::test]
	async fn test_release_twice() {
		let registry = SourceRegistry::default();
		let instance = registry
			.acquire("Flowx", Some(config(Arc::new(MockSource::new("Flowx")), 1_000)))
			.await
			.unwrap();

		assert!(registry.release("Flowx").await);
		assert!(instance.is_closed());
		assert!(!registry.release("Flowx").await);
		assert!(registry.get("Flowx").is_none());

		// A released source can be acquired again as a new instance
		let again = registry
			.acquire("Flowx", Some(config(Arc::new(MockSource::new("Flowx")), 1_000)))
			.await
			.unwrap();
		assert!(!Arc::ptr_eq(&instance, &again));
		registry.release_all().await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_release_during_initialization_closes_instance() {
		let registry = Arc::new(SourceRegistry::default());
		let slow = Arc::new(MockSource::new("Flowx").with_fetch_delay(Duration::from_secs(5)));
		let refreshing = |source: Arc<MockSource>| {
			InstanceConfig::new(
				source,
				SourceOptions::new(CacheOptions::new(10_000)).with_lazy_loading(false),
			)
		};

		let pending = tokio::spawn({
			let registry = Arc::clone(&registry);
			let config = refreshing(slow.clone());
			async move { registry.acquire("Flowx", Some(config)).await }
		});

		tokio::time::sleep(Duration::from_secs(1)).await;
		assert!(registry.release("Flowx").await);

		let first = pending.await.unwrap().unwrap();
		assert!(first.is_closed());
		assert!(registry.get("Flowx").is_none());

		let fresh = Arc::new(MockSource::new("Flowx"));
		let second = registry
			.acquire("Flowx", Some(refreshing(fresh.clone())))
			.await
			.unwrap();
		assert!(!Arc::ptr_eq(&first, &second));

		// Only the second instance keeps refreshing
		tokio::time::sleep(Duration::from_secs(35)).await;
		assert_eq!(slow.fetch_count(), 1);
		assert!(fresh.fetch_count() >= 3);
		assert_eq!(registry.len(), 1);
		registry.release_all().await;
	}

	#[tokio::test]
	async fn test_default_storage_is_shared() {
		let storage = Arc::new(StorageService::in_memory());
		let registry = SourceRegistry::new(storage.clone(), EventBus::default());
		registry
			.acquire("Flowx", Some(config(Arc::new(MockSource::new("Flowx")), 1_000)))
			.await
			.unwrap();

		assert!(storage
			.get_cache("Flowx", StorageProperty::CoinsCache)
			.await
			.unwrap()
			.is_some());
		registry.release_all().await;
	}
}
