//! Multichain indexer entry point.
//!
//! Loads the network configurations, builds the configured normalization modules and
//! either runs one action against a single module or starts a cron-scheduled watcher for
//! every module until interrupted.
//!
//! # Flow
//! 1. Loads network configurations from `config/networks` (or `--config-path`)
//! 2. Connects a node set per network and builds its modules
//! 3. Runs a one-shot action (`--block`, `--mempool`, `--latest`, `--balance`) and exits,
//!    or starts one block watcher per module writing into the file sink
//! 4. Handles graceful shutdown on Ctrl+C

pub mod bootstrap;
pub mod models;
pub mod services;
pub mod utils;

use crate::{
	bootstrap::{
		create_network_modules, initialize_networks, run_one_shot, select_networks, OneShot,
		Result,
	},
	services::{
		blockchain::ClientPool,
		blockwatcher::BlockWatcherService,
		sink::{FileSink, MemorySink},
	},
	utils::{logging::setup_logging, parse_string_to_bytes_size},
};

use clap::Parser;
use dotenvy::dotenv_override;
use std::{
	env::{set_var, var},
	path::PathBuf,
	sync::Arc,
};
use tokio_cron_scheduler::JobScheduler;
use tracing::{error, info};

const DEFAULT_DATA_PATH: &str = "data";

#[derive(Parser)]
#[command(
	name = "multichain-indexer",
	about = "Indexes balance-changing events of many blockchains into one normalized event format.",
	version
)]
struct Cli {
	/// Write logs to file instead of stdout
	#[arg(long)]
	log_file: bool,

	/// Set log level (trace, debug, info, warn, error)
	#[arg(long, value_name = "LEVEL")]
	log_level: Option<String>,

	/// Path to store log files (default: logs/)
	#[arg(long, value_name = "PATH")]
	log_path: Option<String>,

	/// Maximum log file size before rolling (e.g., "1GB", "500MB", "1024KB")
	#[arg(long, value_name = "SIZE", value_parser = parse_string_to_bytes_size)]
	log_max_size: Option<u64>,

	/// Directory holding the network configuration files (default: config/networks)
	#[arg(long, value_name = "PATH")]
	config_path: Option<PathBuf>,

	/// Directory the file sink writes to (default: data/)
	#[arg(long, value_name = "PATH")]
	data_path: Option<PathBuf>,

	/// Network to run against
	#[arg(long, value_name = "NETWORK_SLUG")]
	network: Option<String>,

	/// Module to run, by name
	#[arg(long, value_name = "MODULE_NAME")]
	module: Option<String>,

	/// Process a single block and print its events
	#[arg(long, value_name = "BLOCK_NUMBER", conflicts_with_all = ["mempool", "latest", "balance"])]
	block: Option<u64>,

	/// Process the mempool and print its events
	#[arg(long, conflicts_with_all = ["latest", "balance"])]
	mempool: bool,

	/// Print the latest block height known to the nodes
	#[arg(long, conflicts_with = "balance")]
	latest: bool,

	/// Print the balances of an address
	#[arg(long, value_name = "ADDRESS")]
	balance: Option<String>,

	/// Currency to query with --balance, repeatable
	#[arg(long, value_name = "CURRENCY_ID", requires = "balance")]
	currency: Vec<String>,

	/// Validate configuration files without starting the service
	#[arg(long)]
	check: bool,
}

impl Cli {
	/// Apply CLI options to environment variables, overriding any existing values
	fn apply_to_env(&self) {
		// Reload environment variables from .env file
		dotenv_override().ok();

		if self.log_file {
			set_var("LOG_MODE", "file");
		}

		if let Ok(level) = var("RUST_LOG") {
			set_var("LOG_LEVEL", level);
		}

		if let Some(level) = &self.log_level {
			set_var("LOG_LEVEL", level);
			set_var("RUST_LOG", level);
		}

		if let Some(path) = &self.log_path {
			set_var("LOG_DATA_DIR", path);
		}

		if let Some(max_size) = &self.log_max_size {
			set_var("LOG_MAX_SIZE", max_size.to_string());
		}
	}

	fn one_shot(&self) -> Option<OneShot> {
		if let Some(height) = self.block {
			return Some(OneShot::Block(height));
		}
		if self.mempool {
			return Some(OneShot::Mempool);
		}
		if self.latest {
			return Some(OneShot::Latest);
		}
		self.balance.as_ref().map(|address| OneShot::Balance {
			address: address.clone(),
			currencies: self.currency.clone(),
		})
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	cli.apply_to_env();

	setup_logging().unwrap_or_else(|e| {
		error!("Failed to setup logging: {}", e);
	});

	if cli.check {
		validate_configuration(&cli).await;
		return Ok(());
	}

	let networks = initialize_networks(cli.config_path.as_deref())
		.await
		.map_err(|e| anyhow::anyhow!("Failed to load network configuration: {}", e))?;
	let client_pool = ClientPool::new();

	if let Some(action) = cli.one_shot() {
		return execute_one_shot(&cli, &networks, &client_pool, action).await;
	}

	let data_path = cli
		.data_path
		.clone()
		.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH));
	let sink = Arc::new(FileSink::open(data_path).await?);
	let block_watcher = BlockWatcherService::<FileSink, JobScheduler>::new(sink);

	let mut started = Vec::new();
	for network in select_networks(&networks, cli.network.as_deref())? {
		let modules = match create_network_modules(&client_pool, &network, cli.module.as_deref()).await {
			Ok(modules) => modules,
			Err(e) => {
				error!(network = %network.slug, "Failed to create modules: {}", e);
				continue;
			}
		};
		for module in modules {
			let name = module.descriptor().name.clone();
			match block_watcher.start_module_watcher(&network, module).await {
				Ok(()) => started.push(name),
				Err(e) => error!(module = %name, "Failed to start block watcher: {}", e),
			}
		}
	}

	if started.is_empty() {
		info!("No module watchers started. Exiting...");
		return Ok(());
	}

	info!(watchers = started.len(), "Service started. Press Ctrl+C to shutdown");

	if let Err(e) = tokio::signal::ctrl_c().await {
		error!("Error waiting for Ctrl+C: {}", e);
	}
	info!("Shutdown signal received, stopping services...");

	let halted = block_watcher.halted_watchers().await;
	if !halted.is_empty() {
		error!(modules = ?halted, "Some watchers were halted by processing errors");
	}

	let shutdown_futures = started
		.iter()
		.map(|name| block_watcher.stop_module_watcher(name));
	for result in futures::future::join_all(shutdown_futures).await {
		if let Err(e) = result {
			error!("Error during shutdown: {}", e);
		}
	}

	info!("Shutdown complete");
	Ok(())
}

/// Runs one action against the single module selected on the command line
async fn execute_one_shot(
	cli: &Cli,
	networks: &std::collections::HashMap<String, models::Network>,
	client_pool: &ClientPool,
	action: OneShot,
) -> Result<()> {
	let Some(slug) = cli.network.as_deref() else {
		return Err("--network is required for one-shot actions".into());
	};
	let network = select_networks(networks, Some(slug))?.remove(0);
	let modules = create_network_modules(client_pool, &network, cli.module.as_deref()).await?;
	let module = match modules.as_slice() {
		[module] => module.clone(),
		_ => {
			return Err(format!(
				"Network '{}' has {} modules, select one with --module",
				slug,
				modules.len()
			)
			.into())
		}
	};

	info!(
		network = %slug,
		module = %module.descriptor().name,
		action = ?action,
		"Running one-shot action"
	);

	// One-shot runs never touch the watchers' progress on disk
	let sink = MemorySink::new();
	let output = run_one_shot(module.as_ref(), &sink, &action).await?;
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}

/// Loads and validates every network configuration without connecting to any node
async fn validate_configuration(cli: &Cli) {
	info!("Validating configuration files...");

	match initialize_networks(cli.config_path.as_deref()).await {
		Ok(networks) => {
			if networks.is_empty() {
				error!("No network configurations found");
				return;
			}
			let modules: usize = networks.values().map(|network| network.modules.len()).sum();
			info!(
				"✓ Found {} network(s) with {} module(s)",
				networks.len(),
				modules
			);
			info!("Configuration validation completed successfully!");
		}
		Err(e) => {
			error!("{}", e);
		}
	}
}
