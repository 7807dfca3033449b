//! Service layer of the route aggregator.
//!
//! This crate wires configuration, storage and the aggregation core into
//! the `route-aggregator` binary, and provides [`HttpSource`], a liquidity
//! source speaking a small REST protocol.
//!
//! # Components
//!
//! - `cli`: command-line interface definitions
//! - `commands`: the update, watch, route and validate subcommands
//! - `implementations`: concrete liquidity sources
//!
//! [`HttpSource`]: implementations::http::HttpSource

pub mod cli;
pub mod commands;

pub mod implementations {
	pub mod http;
}
