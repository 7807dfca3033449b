//! Tradable assets and the per-source tables that hold them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tradable unit as known to one liquidity source.
///
/// Records are immutable once cached. A refresh supersedes the whole table
/// rather than patching individual fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
	/// Unique type identifier of the asset.
	#[serde(rename = "type")]
	pub coin_type: String,
	/// Decimal precision of the smallest unit.
	pub decimals: u8,
	/// Optional display symbol.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub symbol: Option<String>,
}

impl AssetRecord {
	pub fn new(coin_type: impl Into<String>, decimals: u8, symbol: Option<String>) -> Self {
		Self {
			coin_type: coin_type.into(),
			decimals,
			symbol,
		}
	}
}

/// Short metadata entry persisted alongside the coin table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinMetadata {
	pub coin_type: String,
	pub decimals: u8,
}

impl From<&AssetRecord> for CoinMetadata {
	fn from(record: &AssetRecord) -> Self {
		Self {
			coin_type: record.coin_type.clone(),
			decimals: record.decimals,
		}
	}
}

/// Mapping from asset type identifier to its record.
///
/// Keys are unique and insertion order is irrelevant. A table is owned by a
/// single source cache and replaced as a whole on every successful refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinTable {
	records: HashMap<String, AssetRecord>,
}

impl CoinTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a table from a list of records. A later duplicate replaces an
	/// earlier one.
	pub fn from_records(records: impl IntoIterator<Item = AssetRecord>) -> Self {
		let records = records
			.into_iter()
			.map(|record| (record.coin_type.clone(), record))
			.collect();
		Self { records }
	}

	pub fn get(&self, coin_type: &str) -> Option<&AssetRecord> {
		self.records.get(coin_type)
	}

	pub fn contains(&self, coin_type: &str) -> bool {
		self.records.contains_key(coin_type)
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	pub fn records(&self) -> impl Iterator<Item = &AssetRecord> {
		self.records.values()
	}

	/// Returns all records sorted by type identifier.
	pub fn to_sorted_vec(&self) -> Vec<AssetRecord> {
		let mut records: Vec<AssetRecord> = self.records.values().cloned().collect();
		records.sort_by(|a, b| a.coin_type.cmp(&b.coin_type));
		records
	}
}

/// A tradable pair exposed by sources that enumerate their pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPath {
	pub base: String,
	pub quote: String,
}

impl PoolPath {
	pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
		Self {
			base: base.into(),
			quote: quote.into(),
		}
	}

	/// Key under which the path is stored, `"{base}-{quote}"`.
	pub fn key(&self) -> String {
		format!("{}-{}", self.base, self.quote)
	}
}

/// Paths keyed by `"{base}-{quote}"`.
pub type PathTable = HashMap<String, PoolPath>;

/// Everything one live fetch of a source returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSnapshot {
	pub coins: Vec<AssetRecord>,
	pub metadata: Vec<CoinMetadata>,
	pub paths: Option<PathTable>,
}

impl SourceSnapshot {
	/// Snapshot whose metadata list is derived from the coin records.
	pub fn from_coins(coins: Vec<AssetRecord>) -> Self {
		let metadata = coins.iter().map(CoinMetadata::from).collect();
		Self {
			coins,
			metadata,
			paths: None,
		}
	}

	pub fn with_paths(mut self, paths: impl IntoIterator<Item = PoolPath>) -> Self {
		self.paths = Some(paths.into_iter().map(|path| (path.key(), path)).collect());
		self
	}
}
