//! Cache lifecycle and route aggregation for the route aggregator.
//!
//! A [`SourceRegistry`] owns one [`SourceInstance`] per liquidity source.
//! Each instance hydrates its [`SourceCache`] from storage, keeps it fresh
//! through a single-flight [`Refresher`] and publishes [`CacheEvent`]s on
//! the registry's [`EventBus`]. A [`RouteManager`] fans route requests out
//! to a fixed set of instances and picks the best quote.
//!
//! [`CacheEvent`]: aggregator_types::CacheEvent

pub mod cache;
pub mod coin_manager;
pub mod error;
pub mod event_bus;
pub mod instance;
pub mod refresh;
pub mod registry;
pub mod route_manager;

#[cfg(test)]
mod test_support;

pub use cache::{hydrate, CacheSnapshot, SourceCache};
pub use coin_manager::CoinManager;
pub use error::CoreError;
pub use event_bus::{CacheSubscriber, EventBus};
pub use instance::{InstanceConfig, SourceInstance};
pub use refresh::{RefreshOutcome, Refresher};
pub use registry::SourceRegistry;
pub use route_manager::{select_best, RouteManager};
