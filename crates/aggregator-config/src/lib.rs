// aggregator-config/src/lib.rs

use aggregator_storage::StorageBackend;
use regex::Regex;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub mod types;

pub use types::{AppConfig, RouteConfig, ServiceConfig, SourceConfig, SourceKind};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration file format, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
	Toml,
	Json,
	Yaml,
}

impl ConfigFormat {
	pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Ok(Self::Toml),
			Some("json") => Ok(Self::Json),
			Some("yaml") | Some("yml") => Ok(Self::Yaml),
			_ => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {:?}",
				path
			))),
		}
	}
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "AGGREGATOR_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<AppConfig, ConfigError> {
		let Some(file_path) = &self.file_path else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};
		info!("Loading configuration from {:?}", file_path);

		let content = match tokio::fs::read_to_string(file_path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(ConfigError::FileNotFound(file_path.display().to_string()))
			}
			Err(e) => return Err(e.into()),
		};

		let substituted = substitute_env_vars(&content)?;
		let mut config = parse(&substituted, ConfigFormat::from_path(file_path)?)?;

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	fn apply_env_overrides(&self, config: &mut AppConfig) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			debug!("Overriding log level from environment");
			config.service.log_level = log_level;
		}

		if let Ok(path) = env::var(format!("{}STORAGE_PATH", self.env_prefix)) {
			debug!("Overriding storage path from environment");
			config.storage = StorageBackend::File {
				path: PathBuf::from(path),
			};
		}

		if let Ok(timeout) = env::var(format!("{}QUOTE_TIMEOUT_MS", self.env_prefix)) {
			config.route.quote_timeout_ms = Some(timeout.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid quote timeout: {}", e))
			})?);
		}

		Ok(())
	}
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

/// Parses configuration text in the given format.
pub fn parse(content: &str, format: ConfigFormat) -> Result<AppConfig, ConfigError> {
	match format {
		ConfigFormat::Toml => {
			toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
		ConfigFormat::Json => {
			serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
		ConfigFormat::Yaml => {
			serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
	}
}

/// Replaces `${VAR_NAME}` placeholders with environment values.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;
	let mut result = content.to_string();

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
	if config.sources.is_empty() {
		return Err(ConfigError::ValidationError(
			"At least one source must be configured".to_string(),
		));
	}

	let mut names = HashSet::new();
	for source in &config.sources {
		if source.name.trim().is_empty() {
			return Err(ConfigError::ValidationError(
				"Source name must not be empty".to_string(),
			));
		}
		if !names.insert(source.name.as_str()) {
			return Err(ConfigError::ValidationError(format!(
				"Source '{}' is configured more than once",
				source.name
			)));
		}
		if !source.base_url.starts_with("http://") && !source.base_url.starts_with("https://") {
			return Err(ConfigError::ValidationError(format!(
				"Source '{}' has an invalid base_url: {}",
				source.name, source.base_url
			)));
		}
		if source.page_size == 0 {
			return Err(ConfigError::ValidationError(format!(
				"Source '{}' page_size must be greater than 0",
				source.name
			)));
		}

		let cache = &source.options.cache;
		if cache.update_interval_ms == 0 {
			return Err(ConfigError::ValidationError(format!(
				"Source '{}' update_interval_ms must be greater than 0",
				source.name
			)));
		}
		if cache.max_caches_update_time_ms == Some(0) {
			return Err(ConfigError::ValidationError(format!(
				"Source '{}' max_caches_update_time_ms must be greater than 0",
				source.name
			)));
		}
	}

	if config.route.quote_timeout_ms == Some(0) {
		return Err(ConfigError::ValidationError(
			"quote_timeout_ms must be greater than 0".to_string(),
		));
	}

	Ok(())
}
