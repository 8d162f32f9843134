//! Builder of [`Network`] values for tests. Defaults describe a small EVM chain with a
//! single node and the `evm-main` module.

use crate::models::{
	BlockChainType, ModuleConfig, ModuleKind, Network, RpcUrl, SecretString, SecretValue,
};

pub struct NetworkBuilder {
	name: String,
	slug: String,
	network_type: BlockChainType,
	chain_id: Option<u64>,
	rpc_urls: Vec<RpcUrl>,
	block_time_ms: u64,
	confirmation_blocks: u64,
	cron_schedule: String,
	max_past_blocks: Option<u64>,
	request_timeout_ms: Option<u64>,
	max_concurrency: Option<usize>,
	consensus_nodes: Option<usize>,
	modules: Vec<ModuleConfig>,
}

fn plain_url(url: &str, type_: &str, weight: u32) -> RpcUrl {
	RpcUrl {
		type_: type_.to_string(),
		url: SecretValue::Plain(SecretString::new(url.to_string())),
		weight,
	}
}

impl Default for NetworkBuilder {
	fn default() -> Self {
		Self {
			name: "Test Network".to_string(),
			slug: "test_network".to_string(),
			network_type: BlockChainType::EVM,
			chain_id: Some(1),
			rpc_urls: vec![plain_url("https://test.network", "rpc", 100)],
			block_time_ms: 1000,
			confirmation_blocks: 1,
			cron_schedule: "0 */5 * * * *".to_string(),
			max_past_blocks: Some(10),
			request_timeout_ms: None,
			max_concurrency: None,
			consensus_nodes: None,
			modules: vec![ModuleConfig::new(ModuleKind::EvmMain)],
		}
	}
}

impl NetworkBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn name(mut self, name: &str) -> Self {
		self.name = name.to_string();
		self
	}

	pub fn slug(mut self, slug: &str) -> Self {
		self.slug = slug.to_string();
		self
	}

	/// Sets the chain family and replaces the modules with the family's first module kind.
	pub fn network_type(mut self, network_type: BlockChainType) -> Self {
		self.network_type = network_type;
		if let Some(kind) = <ModuleKind as strum::IntoEnumIterator>::iter()
			.find(|kind| kind.chain() == network_type)
		{
			self.modules = vec![ModuleConfig::new(kind)];
		}
		self
	}

	pub fn chain_id(mut self, chain_id: u64) -> Self {
		self.chain_id = Some(chain_id);
		self
	}

	pub fn rpc_url(mut self, url: &str) -> Self {
		self.rpc_urls = vec![plain_url(url, "rpc", 100)];
		self
	}

	pub fn rpc_urls(mut self, urls: Vec<&str>) -> Self {
		self.rpc_urls = urls
			.into_iter()
			.map(|url| plain_url(url, "rpc", 100))
			.collect();
		self
	}

	pub fn add_rpc_url(mut self, url: &str, type_: &str, weight: u32) -> Self {
		self.rpc_urls.push(plain_url(url, type_, weight));
		self
	}

	pub fn add_secret_rpc_url(mut self, url: SecretValue, type_: &str, weight: u32) -> Self {
		self.rpc_urls.push(RpcUrl {
			type_: type_.to_string(),
			url,
			weight,
		});
		self
	}

	pub fn clear_rpc_urls(mut self) -> Self {
		self.rpc_urls.clear();
		self
	}

	pub fn block_time_ms(mut self, block_time: u64) -> Self {
		self.block_time_ms = block_time;
		self
	}

	pub fn confirmation_blocks(mut self, blocks: u64) -> Self {
		self.confirmation_blocks = blocks;
		self
	}

	pub fn cron_schedule(mut self, schedule: &str) -> Self {
		self.cron_schedule = schedule.to_string();
		self
	}

	pub fn max_past_blocks(mut self, blocks: u64) -> Self {
		self.max_past_blocks = Some(blocks);
		self
	}

	pub fn request_timeout_ms(mut self, timeout: u64) -> Self {
		self.request_timeout_ms = Some(timeout);
		self
	}

	pub fn max_concurrency(mut self, limit: usize) -> Self {
		self.max_concurrency = Some(limit);
		self
	}

	pub fn consensus_nodes(mut self, count: usize) -> Self {
		self.consensus_nodes = Some(count);
		self
	}

	pub fn module(mut self, module: ModuleConfig) -> Self {
		self.modules.push(module);
		self
	}

	pub fn modules(mut self, modules: Vec<ModuleConfig>) -> Self {
		self.modules = modules;
		self
	}

	pub fn build(self) -> Network {
		Network {
			name: self.name,
			slug: self.slug,
			network_type: self.network_type,
			chain_id: self.chain_id,
			rpc_urls: self.rpc_urls,
			block_time_ms: self.block_time_ms,
			confirmation_blocks: self.confirmation_blocks,
			cron_schedule: self.cron_schedule,
			max_past_blocks: self.max_past_blocks,
			request_timeout_ms: self.request_timeout_ms,
			max_concurrency: self.max_concurrency,
			consensus_nodes: self.consensus_nodes,
			modules: self.modules,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_network() {
		let network = NetworkBuilder::new().build();

		assert_eq!(network.name, "Test Network");
		assert_eq!(network.slug, "test_network");
		assert_eq!(network.network_type, BlockChainType::EVM);
		assert_eq!(network.rpc_urls.len(), 1);
		assert_eq!(network.modules, vec![ModuleConfig::new(ModuleKind::EvmMain)]);
		assert_eq!(network.request_timeout_ms(), 30_000);
		assert_eq!(network.max_concurrency(), 8);
	}

	#[test]
	fn test_network_type_selects_matching_module() {
		let network = NetworkBuilder::new()
			.network_type(BlockChainType::Stellar)
			.build();
		assert_eq!(network.modules[0].kind, ModuleKind::StellarMain);
	}

	#[test]
	fn test_weighted_rpc_urls() {
		let network = NetworkBuilder::new()
			.clear_rpc_urls()
			.add_rpc_url("https://low.example", "rpc", 10)
			.add_rpc_url("https://ws.example", "ws", 100)
			.add_rpc_url("https://high.example", "rpc", 90)
			.build();

		let urls: Vec<&str> = network
			.weighted_rpc_urls()
			.iter()
			.map(|rpc_url| rpc_url.url.as_str())
			.collect();
		assert_eq!(urls, vec!["https://high.example", "https://low.example"]);
		assert_eq!(network.consensus_node_count(), 2);

		let limited = NetworkBuilder::new()
			.rpc_urls(vec!["https://a", "https://b", "https://c"])
			.consensus_nodes(2)
			.build();
		assert_eq!(limited.consensus_node_count(), 2);
	}
}
