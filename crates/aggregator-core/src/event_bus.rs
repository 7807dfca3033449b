//! Event bus for cache update notifications.
//!
//! Every source instance publishes a [`CacheEvent`] after a successful
//! refresh. Observers either hold a raw receiver or implement
//! [`CacheSubscriber`] and get a dedicated forwarding task.

use aggregator_types::CacheEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Receiver side of cache notifications.
///
/// Each attached subscriber sees every event published after it was
/// attached, in publish order. Delivery order across subscribers is
/// unspecified.
#[async_trait]
pub trait CacheSubscriber: Send + Sync {
	async fn on_event(&self, event: &CacheEvent);
}

/// Event bus for broadcasting cache events to multiple subscribers.
///
/// Cloning an EventBus creates a new handle to the same underlying
/// broadcast channel.
#[derive(Clone)]
pub struct EventBus {
	/// The broadcast sender used to publish events.
	sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
	/// Creates a new EventBus with the specified channel capacity.
	///
	/// The capacity determines how many events can be buffered before a
	/// slow subscriber starts missing events.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Returns the number of receivers the event reached. Having no
	/// subscribers is not an error for a cache.
	pub fn publish(&self, event: CacheEvent) -> usize {
		match self.sender.send(event) {
			Ok(receivers) => receivers,
			Err(_) => {
				debug!("Cache event published without subscribers");
				0
			}
		}
	}

	/// Spawns a task forwarding every event to `subscriber` until the bus
	/// is dropped or the returned handle is aborted.
	pub fn attach(&self, subscriber: Arc<dyn CacheSubscriber>) -> JoinHandle<()> {
		let mut receiver = self.subscribe();
		tokio::spawn(async move {
			loop {
				match receiver.recv().await {
					Ok(event) => subscriber.on_event(&event).await,
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!("Cache subscriber lagged behind, skipped {} events", skipped);
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		})
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use aggregator_types::AssetRecord;
	use tokio::sync::Mutex;

	#[derive(Default)]
	struct Recorder {
		seen: Mutex<Vec<(String, u64)>>,
	}

	#[async_trait]
	impl CacheSubscriber for Recorder {
		async fn on_event(&self, event: &CacheEvent) {
			let CacheEvent::CachesUpdated {
				source_name,
				generation,
				..
			} = event;
			self.seen
				.lock()
				.await
				.push((source_name.clone(), *generation));
		}
	}

	fn updated(source_name: &str, generation: u64) -> CacheEvent {
		CacheEvent::CachesUpdated {
			source_name: source_name.to_string(),
			generation,
			coins: Arc::new(vec![AssetRecord::new("0x2::sui::SUI", 9, None)]),
		}
	}

	#[tokio::test]
	async fn test_publish_without_subscribers() {
		let bus = EventBus::new(4);
		assert_eq!(bus.publish(updated("Flowx", 1)), 0);
	}

	#[tokio::test]
	async fn test_each_subscriber_sees_every_event_once() {
		let bus = EventBus::new(16);
		let first = Arc::new(Recorder::default());
		let second = Arc::new(Recorder::default());
		let first_task = bus.attach(first.clone());
		let second_task = bus.attach(second.clone());

		bus.publish(updated("Flowx", 1));
		bus.publish(updated("Cetus", 1));
		bus.publish(updated("Flowx", 2));

		// Dropping the last sender closes the channel and ends both tasks
		drop(bus);
		first_task.await.unwrap();
		second_task.await.unwrap();

		let expected = vec![
			("Flowx".to_string(), 1),
			("Cetus".to_string(), 1),
			("Flowx".to_string(), 2),
		];
		assert_eq!(*first.seen.lock().await, expected);
		assert_eq!(*second.seen.lock().await, expected);
	}
}
