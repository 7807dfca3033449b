//! Liquidity source backed by a REST API.
//!
//! The backend is expected to expose:
//!
//! - `GET /coins?limit={n}&page={p}`: one page of `{coinType, decimals, symbol?}`
//! - `GET /pairs`: `[{base, quote}]`, only when paths are enabled
//! - `GET /quote?tokenIn&tokenOut&amountIn`: `{amountOut, ...}`
//! - `POST /swap` with `{route, sender, slippage}`: the transaction payload

use aggregator_config::SourceConfig;
use aggregator_types::{
	AssetRecord, LiquiditySource, PathSource, PathTable, PoolPath, RouteQuery, SourceCapabilities,
	SourceError, SourceRoute, SourceSnapshot, SwapTransaction,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Upper bound on coin pages, in case a backend never returns a short page.
const MAX_COIN_PAGES: u32 = 10_000;

pub struct HttpSource {
	name: String,
	base_url: String,
	page_size: u32,
	paths_enabled: bool,
	client: reqwest::Client,
}

impl HttpSource {
	pub fn new(
		name: impl Into<String>,
		base_url: impl Into<String>,
		page_size: u32,
		paths_enabled: bool,
		request_timeout: Duration,
	) -> Result<Self, SourceError> {
		let base_url = base_url.into();
		reqwest::Url::parse(&base_url)
			.map_err(|e| SourceError::Unavailable(format!("Invalid base URL {}: {}", base_url, e)))?;

		let client = reqwest::Client::builder()
			.timeout(request_timeout)
			.build()
			.map_err(|e| SourceError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			name: name.into(),
			base_url: base_url.trim_end_matches('/').to_string(),
			page_size: page_size.max(1),
			paths_enabled,
			client,
		})
	}

	pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
		Self::new(
			config.name.clone(),
			config.base_url.clone(),
			config.page_size,
			config.paths_enabled,
			Duration::from_millis(config.request_timeout_ms),
		)
	}

	fn url(&self, endpoint: &str) -> String {
		format!("{}/{}", self.base_url, endpoint)
	}

	async fn read_json<T: DeserializeOwned>(
		&self,
		request: reqwest::RequestBuilder,
	) -> Result<T, SourceError> {
		let response = request
			.send()
			.await
			.map_err(|e| SourceError::Unavailable(format!("HTTP request failed: {}", e)))?;

		if !response.status().is_success() {
			return Err(SourceError::Unavailable(format!(
				"HTTP request to {} failed with status: {}",
				response.url(),
				response.status()
			)));
		}

		response
			.json()
			.await
			.map_err(|e| SourceError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
	}

	async fn fetch_coins_page(&self, page: u32) -> Result<Vec<AssetRecord>, SourceError> {
		let request = self
			.client
			.get(self.url("coins"))
			.query(&[("limit", self.page_size), ("page", page)]);
		let items: Vec<Value> = self.read_json(request).await?;

		items.iter().map(parse_coin).collect()
	}
}

/// Validates one entry of a coins page.
fn parse_coin(item: &Value) -> Result<AssetRecord, SourceError> {
	let coin_type = item
		.get("coinType")
		.and_then(Value::as_str)
		.ok_or_else(|| SourceError::InvalidResponse(format!("coinType must be a string: {}", item)))?;

	let decimals = item
		.get("decimals")
		.and_then(Value::as_u64)
		.and_then(|decimals| u8::try_from(decimals).ok())
		.ok_or_else(|| {
			SourceError::InvalidResponse(format!("decimals must be a small integer: {}", item))
		})?;

	let symbol = match item.get("symbol") {
		None | Some(Value::Null) => None,
		Some(Value::String(symbol)) => Some(symbol.clone()),
		Some(other) => {
			return Err(SourceError::InvalidResponse(format!(
				"symbol must be a string: {}",
				other
			)))
		}
	};

	Ok(AssetRecord::new(coin_type, decimals, symbol))
}

/// Reads `amountOut`, given either as an integer string or a JSON number.
fn parse_amount_out(body: &Value) -> Result<u128, SourceError> {
	match body.get("amountOut") {
		Some(Value::String(amount)) => amount.parse().map_err(|_| {
			SourceError::InvalidResponse(format!("amountOut is not an integer: {}", amount))
		}),
		Some(Value::Number(amount)) => amount.as_u64().map(u128::from).ok_or_else(|| {
			SourceError::InvalidResponse(format!("amountOut is not an integer: {}", amount))
		}),
		_ => Err(SourceError::InvalidResponse(
			"quote response has no amountOut".to_string(),
		)),
	}
}

#[async_trait]
impl PathSource for HttpSource {
	async fn fetch_paths(&self) -> Result<PathTable, SourceError> {
		let paths: Vec<PoolPath> = self.read_json(self.client.get(self.url("pairs"))).await?;
		Ok(paths.into_iter().map(|path| (path.key(), path)).collect())
	}
}

#[async_trait]
impl LiquiditySource for HttpSource {
	fn name(&self) -> &str {
		&self.name
	}

	fn capabilities(&self) -> SourceCapabilities {
		SourceCapabilities {
			supports_path_enumeration: self.paths_enabled,
		}
	}

	fn as_path_source(&self) -> Option<&dyn PathSource> {
		self.paths_enabled.then_some(self as &dyn PathSource)
	}

	async fn fetch_snapshot(&self) -> Result<SourceSnapshot, SourceError> {
		let mut coins = Vec::new();

		for page in 1..=MAX_COIN_PAGES {
			let batch = self.fetch_coins_page(page).await?;
			let received = batch.len();
			coins.extend(batch);
			debug!("[{}] Fetched coins page {} ({} coins)", self.name, page, received);

			if received < self.page_size as usize {
				break;
			}
		}

		Ok(SourceSnapshot::from_coins(coins))
	}

	async fn get_route_data(&self, query: &RouteQuery) -> Result<SourceRoute, SourceError> {
		let request = self.client.get(self.url("quote")).query(&[
			("tokenIn", query.coin_type_from.clone()),
			("tokenOut", query.coin_type_to.clone()),
			("amountIn", query.input_amount_raw.to_string()),
		]);
		let body: Value = self.read_json(request).await?;

		Ok(SourceRoute {
			output_amount: parse_amount_out(&body)?,
			route: body,
		})
	}

	async fn build_swap_transaction(
		&self,
		route: &Value,
		signer_address: &str,
		slippage_percentage: Decimal,
	) -> Result<SwapTransaction, SourceError> {
		let request = self.client.post(self.url("swap")).json(&serde_json::json!({
			"route": route,
			"sender": signer_address,
			"slippage": slippage_percentage.to_string(),
		}));
		let payload: Value = self.read_json(request).await?;

		Ok(SwapTransaction {
			source_name: self.name.clone(),
			payload,
		})
	}
}
