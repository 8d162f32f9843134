//! Module construction from configuration.

use std::{collections::HashMap, sync::Arc};

use crate::{
	models::{ModuleConfig, ModuleKind, Network},
	services::{
		blockchain::{BlockchainTransport, NodeSet},
		indexer::{IndexerError, IndexerModule},
		modules::{
			beacon::BeaconChainModule,
			cosmos::CosmosMainModule,
			evm::{EvmMainModule, EvmTokenModule, EvmTraceModule, TokenStandard},
			filecoin::FilecoinMainModule,
			ripple::RippleMainModule,
			solana::{SolanaMainModule, SolanaSplModule},
			starknet::StarknetMainModule,
			stellar::StellarMainModule,
			substrate::SubstrateMainModule,
			tron::TvmMainModule,
			utxo::UtxoMainModule,
		},
	},
};

/// Builds the module described by `config` for `network`
///
/// Module options are parsed here, so a missing or malformed option is reported before
/// any block is fetched.
pub fn create_module<T: BlockchainTransport + 'static>(
	network: &Network,
	config: &ModuleConfig,
	nodes: Arc<NodeSet<T>>,
) -> Result<Box<dyn IndexerModule>, IndexerError> {
	if config.kind.chain() != network.network_type {
		return Err(IndexerError::developer_error(
			format!(
				"Module {} cannot index a {:?} network",
				config.kind, network.network_type
			),
			None,
			Some(HashMap::from([
				("network".to_string(), network.slug.clone()),
				("kind".to_string(), config.kind.to_string()),
			])),
		));
	}

	let name = config.resolved_name(&network.slug);
	let module: Box<dyn IndexerModule> = match config.kind {
		ModuleKind::EvmMain => Box::new(EvmMainModule::new(name, config, nodes)?),
		ModuleKind::EvmErc20 => Box::new(EvmTokenModule::new(
			name,
			TokenStandard::Erc20,
			config,
			nodes,
		)?),
		ModuleKind::EvmErc721 => Box::new(EvmTokenModule::new(
			name,
			TokenStandard::Erc721,
			config,
			nodes,
		)?),
		ModuleKind::EvmErc1155 => Box::new(EvmTokenModule::new(
			name,
			TokenStandard::Erc1155,
			config,
			nodes,
		)?),
		ModuleKind::EvmTrace => Box::new(EvmTraceModule::new(name, config, nodes)?),
		ModuleKind::UtxoMain => Box::new(UtxoMainModule::new(name, config, nodes)?),
		ModuleKind::SubstrateMain => Box::new(SubstrateMainModule::new(name, config, nodes)?),
		ModuleKind::BeaconChain => Box::new(BeaconChainModule::new(name, config, nodes)?),
		ModuleKind::CosmosMain => Box::new(CosmosMainModule::new(name, config, nodes)?),
		ModuleKind::SolanaMain => Box::new(SolanaMainModule::new(name, config, nodes)?),
		ModuleKind::SolanaSpl => Box::new(SolanaSplModule::new(name, config, nodes)?),
		ModuleKind::FilecoinMain => Box::new(FilecoinMainModule::new(name, config, nodes)?),
		ModuleKind::RippleMain => Box::new(RippleMainModule::new(name, config, nodes)?),
		ModuleKind::StellarMain => Box::new(StellarMainModule::new(name, config, nodes)?),
		ModuleKind::StarknetMain => Box::new(StarknetMainModule::new(name, config, nodes)?),
		ModuleKind::TvmMain => Box::new(TvmMainModule::new(name, config, nodes)?),
	};

	tracing::debug!(
		network = %network.slug,
		module = %module.descriptor().name,
		"Module created"
	);
	Ok(module)
}

/// Builds every module configured for `network`, sharing one node set
pub fn create_modules<T: BlockchainTransport + 'static>(
	network: &Network,
	nodes: Arc<NodeSet<T>>,
) -> Result<Vec<Box<dyn IndexerModule>>, IndexerError> {
	network
		.modules
		.iter()
		.map(|config| create_module(network, config, nodes.clone()))
		.collect()
}
