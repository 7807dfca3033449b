use crate::assets::AssetRecord;
use std::sync::Arc;

/// Notification emitted by a source instance's cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
	/// A refresh replaced the cache with a new coin list.
	CachesUpdated {
		source_name: String,
		generation: u64,
		coins: Arc<Vec<AssetRecord>>,
	},
}

impl CacheEvent {
	pub fn source_name(&self) -> &str {
		match self {
			Self::CachesUpdated { source_name, .. } => source_name,
		}
	}
}
