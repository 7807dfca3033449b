//! # Aggregator Types
//!
//! Shared models and traits for the route aggregator. Every other crate in
//! the workspace builds on the data model defined here: tradable assets and
//! the per-source tables they are cached in, the persisted cache envelope,
//! per-source cache options, route requests and candidates, and the
//! `LiquiditySource` seam that backend-specific collaborators implement.

pub mod amount;
pub mod assets;
pub mod cache;
pub mod events;
pub mod route;
pub mod source;

pub use amount::{format_raw_amount, to_raw_amount, AmountError};
pub use assets::{AssetRecord, CoinMetadata, CoinTable, PathTable, PoolPath, SourceSnapshot};
pub use cache::{CacheEnvelope, CacheOptions, SourceOptions, StorageProperty};
pub use events::CacheEvent;
pub use route::{BestRoute, RouteCandidate, RouteQuery, RouteRequest, SourceRoute, SwapTransaction};
pub use source::{LiquiditySource, PathSource, SourceCapabilities, SourceError};
