use aggregator_config::{AppConfig, ConfigLoader};
use aggregator_service::cli::{Cli, Command};
use aggregator_service::commands;
use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = load_config(&cli).await?;

	// The CLI flag wins over the configured level
	let log_level = cli
		.log_level
		.clone()
		.unwrap_or_else(|| config.service.log_level.clone());
	setup_tracing(&log_level)?;

	info!("Starting {}", config.service.name);

	match &cli.command {
		Command::UpdateCaches => commands::update_caches(&config).await,
		Command::WatchCaches => commands::watch_caches(&config, setup_shutdown_signal()).await,
		Command::FindRoute(args) => {
			commands::find_route(&config, args, setup_shutdown_signal()).await
		}
		Command::Validate => {
			commands::validate(&config);
			Ok(())
		}
	}
}

async fn load_config(cli: &Cli) -> Result<AppConfig> {
	ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {:?}", cli.config))
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.try_init()
		.context("Failed to initialize tracing")?;

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("Failed to install Ctrl+C handler: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				error!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
