//! Bootstrap module for loading configuration and building the modules to run.
//!
//! The binary either starts one watcher per configured module or runs a single one-shot
//! action against one module:
//!
//! - `initialize_networks`: Loads and validates the network configuration files
//! - `select_networks`: Narrows the loaded networks to the one named on the command line
//! - `create_network_modules`: Builds the modules of a network on top of its node set
//! - `run_one_shot`: Processes one block, reads the latest height or queries a balance

use serde_json::{json, Value};
use std::{collections::HashMap, error::Error, path::Path, sync::Arc};

use crate::{
	models::{BlockId, ConfigLoader, Network},
	services::{
		blockchain::ClientPoolTrait,
		indexer::{create_modules, processor, IndexerModule},
		sink::Sink,
	},
};

/// Type alias for handling ServiceResult
pub type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// A single action run instead of the watchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneShot {
	/// Process one confirmed block and print its output
	Block(u64),
	/// Process the current mempool
	Mempool,
	/// Print the latest block height known to the nodes
	Latest,
	/// Print the balances of an address
	Balance {
		address: String,
		currencies: Vec<String>,
	},
}

/// Loads every network configuration below `path`, `config/networks` by default
pub async fn initialize_networks(path: Option<&Path>) -> Result<HashMap<String, Network>> {
	let networks: HashMap<String, Network> = Network::load_all(path).await?;
	Ok(networks)
}

/// Networks to run, in slug order
pub fn select_networks(
	networks: &HashMap<String, Network>,
	slug: Option<&str>,
) -> Result<Vec<Network>> {
	if let Some(slug) = slug {
		return match networks.values().find(|network| network.slug == slug) {
			Some(network) => Ok(vec![network.clone()]),
			None => Err(format!("Network '{}' is not configured", slug).into()),
		};
	}

	let mut selected: Vec<Network> = networks.values().cloned().collect();
	selected.sort_by(|a, b| a.slug.cmp(&b.slug));
	Ok(selected)
}

/// Builds the modules of `network`, or only the one called `module`
pub async fn create_network_modules<P: ClientPoolTrait>(
	client_pool: &P,
	network: &Network,
	module: Option<&str>,
) -> Result<Vec<Arc<dyn IndexerModule>>> {
	let nodes = client_pool.get_node_set(network).await?;
	let modules: Vec<Arc<dyn IndexerModule>> = create_modules(network, nodes)?
		.into_iter()
		.filter(|m| module.is_none_or(|name| m.descriptor().name == name))
		.map(Arc::<dyn IndexerModule>::from)
		.collect();

	if let (Some(name), true) = (module, modules.is_empty()) {
		return Err(format!("Module '{}' is not configured on network '{}'", name, network.slug).into());
	}
	Ok(modules)
}

/// Runs `action` against `module` and returns what should be printed
pub async fn run_one_shot<S: Sink>(
	module: &dyn IndexerModule,
	sink: &S,
	action: &OneShot,
) -> Result<Value> {
	let name = module.descriptor().name.clone();
	let result = match action {
		OneShot::Block(height) => {
			let output = processor::process_block(module, sink, BlockId::Height(*height)).await?;
			json!({
				"module": name,
				"block": height,
				"events": output.events,
				"currencies": output.currencies,
			})
		}
		OneShot::Mempool => {
			let output = processor::process_block(module, sink, BlockId::Mempool).await?;
			json!({
				"module": name,
				"block": BlockId::Mempool,
				"events": output.events,
			})
		}
		OneShot::Latest => {
			let latest = module.inquire_latest_block().await?;
			json!({"module": name, "latest_block": latest})
		}
		OneShot::Balance {
			address,
			currencies,
		} => {
			let balances = module.api_get_balance(address, currencies).await?;
			json!({
				"module": name,
				"address": address,
				"currencies": currencies,
				"balances": balances,
			})
		}
	};
	Ok(result)
}
