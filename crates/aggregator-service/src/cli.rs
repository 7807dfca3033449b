//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "route-aggregator")]
#[command(about = "Multi-source route aggregator", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
	#[command(subcommand)]
	pub command: Command,

	/// Path to configuration file
	#[arg(short, long, value_name = "FILE", env = "AGGREGATOR_CONFIG", default_value = "config/local.toml")]
	pub config: PathBuf,

	/// Log level override (trace, debug, info, warn, error)
	#[arg(long, env = "AGGREGATOR_LOG_LEVEL")]
	pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Refresh every configured source once and store the caches
	UpdateCaches,
	/// Keep source caches fresh until interrupted
	WatchCaches,
	/// Find the best route across all sources
	FindRoute(FindRouteArgs),
	/// Validate the configuration file
	Validate,
}

#[derive(Args, Debug, Clone)]
pub struct FindRouteArgs {
	/// Type of the coin to sell
	#[arg(long)]
	pub from: String,

	/// Type of the coin to buy
	#[arg(long)]
	pub to: String,

	/// Amount to sell in human-readable units
	#[arg(long)]
	pub amount: Decimal,

	/// Slippage tolerance in percent
	#[arg(long, default_value = "1")]
	pub slippage: Decimal,

	/// Address that signs the swap
	#[arg(long, env = "AGGREGATOR_SIGNER")]
	pub signer: Option<String>,

	/// Repeat the search on this period instead of running once
	#[arg(long)]
	pub interval_ms: Option<u64>,

	/// Also build the transaction of the winning route
	#[arg(long)]
	pub build_tx: bool,
}
