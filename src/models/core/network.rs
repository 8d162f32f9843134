use serde::{Deserialize, Serialize};

use crate::models::{BlockChainType, ModuleConfig, SecretValue};

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Configuration for connecting to and indexing a blockchain network.
///
/// Defines the nodes to read from, how often to look for new blocks, and which
/// normalization modules run against the network.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Network {
	/// Chain family of the network's nodes
	pub network_type: BlockChainType,

	/// Unique identifier for this network
	pub slug: String,

	/// Human-readable name of the network
	pub name: String,

	/// List of RPC endpoints with their weights for load balancing
	pub rpc_urls: Vec<RpcUrl>,

	/// Chain ID for EVM networks
	#[serde(default)]
	pub chain_id: Option<u64>,

	/// Average block time in milliseconds
	pub block_time_ms: u64,

	/// Number of blocks needed for confirmation
	pub confirmation_blocks: u64,

	/// Cron expression for how often to check for new blocks
	pub cron_schedule: String,

	/// Maximum number of past blocks to process
	#[serde(default)]
	pub max_past_blocks: Option<u64>,

	/// Per-request timeout in milliseconds
	#[serde(default)]
	pub request_timeout_ms: Option<u64>,

	/// Upper bound of concurrent requests issued by one batch
	#[serde(default)]
	pub max_concurrency: Option<usize>,

	/// Number of nodes queried when verifying a block's identity
	#[serde(default)]
	pub consensus_nodes: Option<usize>,

	/// Normalization modules indexing this network
	pub modules: Vec<ModuleConfig>,
}

impl Network {
	pub fn request_timeout_ms(&self) -> u64 {
		self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)
	}

	pub fn max_concurrency(&self) -> usize {
		self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY).max(1)
	}

	/// URLs of type `rpc`, highest weight first
	pub fn weighted_rpc_urls(&self) -> Vec<&RpcUrl> {
		let mut urls: Vec<&RpcUrl> = self
			.rpc_urls
			.iter()
			.filter(|rpc_url| rpc_url.type_ == "rpc")
			.collect();
		urls.sort_by(|a, b| b.weight.cmp(&a.weight));
		urls
	}

	/// How many nodes take part in identity verification
	pub fn consensus_node_count(&self) -> usize {
		let available = self.weighted_rpc_urls().len();
		self.consensus_nodes
			.map(|count| count.clamp(1, available.max(1)))
			.unwrap_or(available)
	}
}

/// RPC endpoint configuration with load balancing weight
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RpcUrl {
	/// Type of RPC endpoint (e.g. "rpc")
	pub type_: String,

	/// URL of the RPC endpoint (can be a secret value)
	pub url: SecretValue,

	/// Weight for load balancing (0-100)
	pub weight: u32,
}
