use serde_json::json;

use multichain_indexer::{
	models::{BlockChainType, CurrencyFormat, ModuleConfig, ModuleKind},
	services::indexer::{create_module, create_modules, IndexerError},
	utils::tests::{FixtureTransport, NetworkBuilder},
};

fn module_config(value: serde_json::Value) -> ModuleConfig {
	serde_json::from_value(value).unwrap()
}

#[test]
fn test_modules_share_the_network_node_set() {
	let network = NetworkBuilder::new()
		.slug("ethereum")
		.modules(vec![
			ModuleConfig::new(ModuleKind::EvmMain),
			ModuleConfig::new(ModuleKind::EvmErc20),
			module_config(json!({"kind": "evm-trace", "name": "eth-internal"})),
		])
		.build();

	let modules = create_modules(&network, FixtureTransport::default().into_node_set()).unwrap();

	let names: Vec<&str> = modules
		.iter()
		.map(|module| module.descriptor().name.as_str())
		.collect();
	assert_eq!(
		names,
		vec!["ethereum-evm-main", "ethereum-evm-erc-20", "eth-internal"]
	);

	let main = modules[0].descriptor();
	assert!(main.mempool_support);
	assert!(main.currency_format.is_none());

	let tokens = modules[1].descriptor();
	assert_eq!(tokens.kind, ModuleKind::EvmErc20);
	assert_eq!(tokens.currency_format, Some(CurrencyFormat::EvmAddress));
}

#[test]
fn test_module_must_match_network_family() {
	let network = NetworkBuilder::new()
		.network_type(BlockChainType::UTXO)
		.slug("bitcoin")
		.build();

	let result = create_module(
		&network,
		&ModuleConfig::new(ModuleKind::EvmMain),
		FixtureTransport::default().into_node_set(),
	);

	let error = result.err().unwrap();
	assert!(matches!(error, IndexerError::DeveloperError(_)));
	let context = error.context().unwrap();
	assert_eq!(context.metadata_value("network"), Some("bitcoin"));
	assert_eq!(context.metadata_value("kind"), Some("evm-main"));
}

#[test]
fn test_options_are_checked_at_construction() {
	let network = NetworkBuilder::new()
		.network_type(BlockChainType::UTXO)
		.slug("litecoin")
		.build();
	let nodes = FixtureTransport::default().into_node_set();

	let valid = module_config(json!({"kind": "utxo-main", "options": {"decimals": 8}}));
	assert!(create_module(&network, &valid, nodes.clone()).is_ok());

	let unknown_key = module_config(json!({"kind": "utxo-main", "options": {"decimal": 8}}));
	let error = create_module(&network, &unknown_key, nodes.clone()).err().unwrap();
	assert!(matches!(error, IndexerError::DeveloperError(_)));

	let wrong_type = module_config(json!({"kind": "utxo-main", "options": {"decimals": "eight"}}));
	assert!(create_module(&network, &wrong_type, nodes).is_err());
}

#[test]
fn test_beacon_module_requires_fork_schedule() {
	let network = NetworkBuilder::new()
		.network_type(BlockChainType::Beacon)
		.slug("ethereum_beacon")
		.build();
	let nodes = FixtureTransport::default().into_node_set();

	let missing = ModuleConfig::new(ModuleKind::BeaconChain);
	let error = create_module(&network, &missing, nodes.clone()).err().unwrap();
	assert!(matches!(error, IndexerError::DeveloperError(_)));

	let complete = module_config(json!({
		"kind": "beacon-chain",
		"options": {
			"altair_fork_epoch": 74240,
			"bellatrix_fork_epoch": 144896,
			"genesis_time": 1606824023
		}
	}));
	let module = create_module(&network, &complete, nodes).unwrap();
	assert_eq!(module.descriptor().name, "ethereum_beacon-beacon-chain");
}

#[test]
fn test_every_family_builds_its_default_module() {
	for network_type in [
		BlockChainType::EVM,
		BlockChainType::UTXO,
		BlockChainType::Substrate,
		BlockChainType::Cosmos,
		BlockChainType::Solana,
		BlockChainType::Filecoin,
		BlockChainType::Ripple,
		BlockChainType::Stellar,
		BlockChainType::StarkNet,
		BlockChainType::TVM,
	] {
		let network = NetworkBuilder::new().network_type(network_type).build();
		let modules = create_modules(&network, FixtureTransport::default().into_node_set())
			.unwrap_or_else(|e| panic!("{:?} module failed to build: {}", network_type, e));
		assert_eq!(modules.len(), 1);
		assert_eq!(modules[0].descriptor().kind.chain(), network_type);
	}
}
