//! Configuration types for the route aggregator service.

use aggregator_storage::StorageBackend;
use aggregator_types::SourceOptions;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
	pub service: ServiceConfig,
	/// Storage shared by every source that does not bring its own.
	#[serde(default)]
	pub storage: StorageBackend,
	/// Sources in registration order. The order breaks ties between equal
	/// quotes.
	#[serde(default)]
	pub sources: Vec<SourceConfig>,
	#[serde(default)]
	pub route: RouteConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

/// Backend protocol of a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
	#[default]
	Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
	pub name: String,
	#[serde(default)]
	pub kind: SourceKind,
	pub base_url: String,
	/// Coins requested per page when listing the asset universe.
	#[serde(default = "default_page_size")]
	pub page_size: u32,
	/// Whether the backend exposes its pool paths.
	#[serde(default)]
	pub paths_enabled: bool,
	#[serde(default = "default_request_timeout_ms")]
	pub request_timeout_ms: u64,
	pub options: SourceOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
	/// Per-source bound on a single quote.
	#[serde(default)]
	pub quote_timeout_ms: Option<u64>,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_page_size() -> u32 {
	50
}

fn default_request_timeout_ms() -> u64 {
	10_000
}
