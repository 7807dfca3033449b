// aggregator-core/src/error.rs

use aggregator_storage::StorageError;
use aggregator_types::{AmountError, SourceError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error("[{source_name}] Caches update timed out after {after_ms}ms")]
	TimedOut { source_name: String, after_ms: u64 },

	#[error("Corrupt cache entry {key}: {reason}")]
	CorruptCache { key: String, reason: String },

	#[error("[{source_name}] Source unavailable: {reason}")]
	SourceUnavailable { source_name: String, reason: String },

	#[error("No routes found")]
	NoRoutesFound,

	#[error("Instance misuse: {0}")]
	InstanceMisuse(String),

	#[error("Storage error: {0}")]
	Storage(String),

	#[error(transparent)]
	Source(SourceError),

	#[error(transparent)]
	Amount(#[from] AmountError),
}

impl CoreError {
	/// Attributes a source failure to the named source. Transport and
	/// payload failures become `SourceUnavailable`; everything else is kept
	/// as reported.
	pub fn from_source(source_name: &str, error: SourceError) -> Self {
		match error {
			SourceError::Unavailable(reason) | SourceError::InvalidResponse(reason) => {
				Self::SourceUnavailable {
					source_name: source_name.to_string(),
					reason,
				}
			}
			other => Self::Source(other),
		}
	}
}

impl From<SourceError> for CoreError {
	fn from(error: SourceError) -> Self {
		Self::Source(error)
	}
}

impl From<StorageError> for CoreError {
	fn from(error: StorageError) -> Self {
		match error {
			StorageError::Corrupt { key, reason } => Self::CorruptCache { key, reason },
			other => Self::Storage(other.to_string()),
		}
	}
}
