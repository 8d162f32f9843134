use serde_json::json;
use std::{collections::HashMap, path::Path, sync::Arc};
use tempfile::TempDir;

use multichain_indexer::{
	bootstrap::{
		create_network_modules, initialize_networks, run_one_shot, select_networks, OneShot,
	},
	models::{BlockChainType, ModuleConfig, ModuleKind, Network},
	services::{
		blockchain::{ClientPoolTrait, NodeSet},
		sink::MemorySink,
	},
	utils::tests::{FixtureTransport, NetworkBuilder},
};

use crate::integration::mocks::{ScriptedFailure, ScriptedModule};

/// Pool handing out canned node sets instead of connecting
struct FixturePool {
	reachable: bool,
}

#[async_trait::async_trait]
impl ClientPoolTrait for FixturePool {
	type Transport = FixtureTransport;

	async fn get_node_set(
		&self,
		network: &Network,
	) -> Result<Arc<NodeSet<FixtureTransport>>, anyhow::Error> {
		if !self.reachable {
			return Err(anyhow::anyhow!(
				"Failed to connect to any node of {}",
				network.slug
			));
		}
		Ok(FixtureTransport::new("http://fixture.node").into_node_set())
	}
}

fn write_network(dir: &Path, file: &str, slug: &str, name: &str, confirmation_blocks: u64) {
	let config = json!({
		"network_type": "EVM",
		"slug": slug,
		"name": name,
		"chain_id": 1,
		"rpc_urls": [
			{"type_": "rpc", "url": {"type": "plain", "value": "https://eth.example.org"}, "weight": 100}
		],
		"block_time_ms": 12000,
		"confirmation_blocks": confirmation_blocks,
		"cron_schedule": "0 */1 * * * *",
		"max_past_blocks": 18,
		"modules": [
			{"kind": "evm-main"},
			{"kind": "evm-erc-20", "name": "tokens"}
		]
	});
	std::fs::write(dir.join(file), config.to_string()).unwrap();
}

fn networks(slugs: &[&str]) -> HashMap<String, Network> {
	slugs
		.iter()
		.map(|slug| {
			(
				slug.to_string(),
				NetworkBuilder::new().slug(slug).name(slug).build(),
			)
		})
		.collect()
}

#[tokio::test]
async fn test_initialize_networks_keys_by_file_name() {
	let temp_dir = TempDir::new().unwrap();
	write_network(temp_dir.path(), "mainnet.json", "ethereum", "Ethereum", 12);
	write_network(temp_dir.path(), "testnet.json", "sepolia", "Sepolia", 3);
	std::fs::write(temp_dir.path().join("notes.txt"), "not a network").unwrap();

	let networks = initialize_networks(Some(temp_dir.path())).await.unwrap();

	assert_eq!(networks.len(), 2);
	let mainnet = &networks["mainnet"];
	assert_eq!(mainnet.slug, "ethereum");
	assert_eq!(mainnet.confirmation_blocks, 12);
	assert_eq!(mainnet.modules[0].resolved_name("ethereum"), "ethereum-evm-main");
	assert_eq!(mainnet.modules[1].resolved_name("ethereum"), "tokens");
	assert_eq!(networks["testnet"].slug, "sepolia");
}

#[tokio::test]
async fn test_initialize_networks_rejects_invalid_files() {
	let temp_dir = TempDir::new().unwrap();
	write_network(temp_dir.path(), "mainnet.json", "ethereum", "Ethereum", 0);

	let error = initialize_networks(Some(temp_dir.path())).await.unwrap_err();
	assert!(error
		.to_string()
		.contains("Confirmation blocks must be greater than 0"));
}

#[tokio::test]
async fn test_initialize_networks_rejects_duplicate_slugs() {
	let temp_dir = TempDir::new().unwrap();
	write_network(temp_dir.path(), "a.json", "ethereum", "Ethereum", 12);
	write_network(temp_dir.path(), "b.json", "ethereum", "Ethereum Copy", 12);

	let error = initialize_networks(Some(temp_dir.path())).await.unwrap_err();
	assert!(error.to_string().contains("Duplicate network slug found"));
}

#[tokio::test]
async fn test_initialize_networks_requires_directory() {
	let temp_dir = TempDir::new().unwrap();
	let missing = temp_dir.path().join("missing");

	let error = initialize_networks(Some(&missing)).await.unwrap_err();
	assert!(error.to_string().contains("networks directory not found"));
}

#[tokio::test]
async fn test_shipped_configuration_is_valid() {
	let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/networks");

	let networks = initialize_networks(Some(&dir)).await.unwrap();

	assert!(networks.len() >= 11);
	let cosmos = networks
		.values()
		.find(|network| network.network_type == BlockChainType::Cosmos)
		.unwrap();
	assert!(cosmos.rpc_urls.iter().any(|url| url.type_ == "rest"));
}

#[test]
fn test_select_networks() {
	let networks = networks(&["solana", "bitcoin", "ethereum"]);

	let all = select_networks(&networks, None).unwrap();
	let slugs: Vec<&str> = all.iter().map(|network| network.slug.as_str()).collect();
	assert_eq!(slugs, vec!["bitcoin", "ethereum", "solana"]);

	let one = select_networks(&networks, Some("ethereum")).unwrap();
	assert_eq!(one.len(), 1);
	assert_eq!(one[0].slug, "ethereum");

	let error = select_networks(&networks, Some("dogecoin")).unwrap_err();
	assert_eq!(error.to_string(), "Network 'dogecoin' is not configured");
}

#[tokio::test]
async fn test_create_network_modules() {
	let pool = FixturePool { reachable: true };
	let network = NetworkBuilder::new()
		.slug("ethereum")
		.modules(vec![
			ModuleConfig::new(ModuleKind::EvmMain),
			ModuleConfig::new(ModuleKind::EvmErc20),
		])
		.build();

	let modules = create_network_modules(&pool, &network, None).await.unwrap();
	let names: Vec<&str> = modules
		.iter()
		.map(|module| module.descriptor().name.as_str())
		.collect();
	assert_eq!(names, vec!["ethereum-evm-main", "ethereum-evm-erc-20"]);

	let only = create_network_modules(&pool, &network, Some("ethereum-evm-erc-20"))
		.await
		.unwrap();
	assert_eq!(only.len(), 1);
	assert_eq!(only[0].descriptor().kind, ModuleKind::EvmErc20);

	let error = create_network_modules(&pool, &network, Some("ethereum-solana-main"))
		.await
		.err().unwrap();
	assert_eq!(
		error.to_string(),
		"Module 'ethereum-solana-main' is not configured on network 'ethereum'"
	);
}

#[tokio::test]
async fn test_create_network_modules_needs_reachable_nodes() {
	let pool = FixturePool { reachable: false };
	let network = NetworkBuilder::new().slug("ethereum").build();

	let error = create_network_modules(&pool, &network, None).await.err().unwrap();
	assert!(error.to_string().contains("Failed to connect to any node of ethereum"));
}

#[tokio::test]
async fn test_one_shot_block() {
	let module = ScriptedModule::new("eth-evm-main", 100);
	let sink = MemorySink::new();

	let output = run_one_shot(&module, &sink, &OneShot::Block(42)).await.unwrap();

	assert_eq!(output["module"], "eth-evm-main");
	assert_eq!(output["block"], 42);
	assert_eq!(output["events"].as_array().unwrap().len(), 2);
	assert_eq!(output["events"][0]["address"], "alice");
	assert_eq!(output["events"][0]["effect"], "-10");
	assert!(output["currencies"].is_null());
	assert_eq!(sink.emitted("eth-evm-main").len(), 1);
}

#[tokio::test]
async fn test_one_shot_mempool_and_latest() {
	let module = ScriptedModule::new("btc-utxo-main", 840_000);
	let sink = MemorySink::new();

	let mempool = run_one_shot(&module, &sink, &OneShot::Mempool).await.unwrap();
	assert_eq!(mempool["events"].as_array().unwrap().len(), 2);

	let latest = run_one_shot(&module, &sink, &OneShot::Latest).await.unwrap();
	assert_eq!(latest, json!({"module": "btc-utxo-main", "latest_block": 840000}));
}

#[tokio::test]
async fn test_one_shot_balance() {
	let module = ScriptedModule::new("eth-evm-main", 100);
	let sink = MemorySink::new();

	let action = OneShot::Balance {
		address: "0xabc".to_string(),
		currencies: vec![],
	};
	let output = run_one_shot(&module, &sink, &action).await.unwrap();

	assert_eq!(output["address"], "0xabc");
	assert_eq!(output["balances"], json!(["100"]));
}

#[tokio::test]
async fn test_one_shot_block_failure_is_reported() {
	let module = ScriptedModule::new("eth-evm-main", 100).fail_at(42, ScriptedFailure::Unbalanced);
	let sink = MemorySink::new();

	assert!(run_one_shot(&module, &sink, &OneShot::Block(42)).await.is_err());
	assert!(sink.emitted("eth-evm-main").is_empty());
}
