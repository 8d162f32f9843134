//! Module configuration and capability descriptors.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumIter, EnumString};

use crate::{
	models::{BlockChainType, CurrencyFormat},
	services::indexer::IndexerError,
};

/// Closed set of normalization modules
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum ModuleKind {
	#[serde(rename = "evm-main")]
	#[strum(serialize = "evm-main")]
	EvmMain,
	#[serde(rename = "evm-erc-20")]
	#[strum(serialize = "evm-erc-20")]
	EvmErc20,
	#[serde(rename = "evm-erc-721")]
	#[strum(serialize = "evm-erc-721")]
	EvmErc721,
	#[serde(rename = "evm-erc-1155")]
	#[strum(serialize = "evm-erc-1155")]
	EvmErc1155,
	#[serde(rename = "evm-trace")]
	#[strum(serialize = "evm-trace")]
	EvmTrace,
	#[serde(rename = "utxo-main")]
	#[strum(serialize = "utxo-main")]
	UtxoMain,
	#[serde(rename = "substrate-main")]
	#[strum(serialize = "substrate-main")]
	SubstrateMain,
	#[serde(rename = "beacon-chain")]
	#[strum(serialize = "beacon-chain")]
	BeaconChain,
	#[serde(rename = "cosmos-main")]
	#[strum(serialize = "cosmos-main")]
	CosmosMain,
	#[serde(rename = "solana-main")]
	#[strum(serialize = "solana-main")]
	SolanaMain,
	#[serde(rename = "solana-spl")]
	#[strum(serialize = "solana-spl")]
	SolanaSpl,
	#[serde(rename = "filecoin-main")]
	#[strum(serialize = "filecoin-main")]
	FilecoinMain,
	#[serde(rename = "ripple-main")]
	#[strum(serialize = "ripple-main")]
	RippleMain,
	#[serde(rename = "stellar-main")]
	#[strum(serialize = "stellar-main")]
	StellarMain,
	#[serde(rename = "starknet-main")]
	#[strum(serialize = "starknet-main")]
	StarknetMain,
	#[serde(rename = "tvm-main")]
	#[strum(serialize = "tvm-main")]
	TvmMain,
}

impl ModuleKind {
	/// The chain family whose nodes this module reads
	pub fn chain(&self) -> BlockChainType {
		match self {
			ModuleKind::EvmMain
			| ModuleKind::EvmErc20
			| ModuleKind::EvmErc721
			| ModuleKind::EvmErc1155
			| ModuleKind::EvmTrace => BlockChainType::EVM,
			ModuleKind::UtxoMain => BlockChainType::UTXO,
			ModuleKind::SubstrateMain => BlockChainType::Substrate,
			ModuleKind::BeaconChain => BlockChainType::Beacon,
			ModuleKind::CosmosMain => BlockChainType::Cosmos,
			ModuleKind::SolanaMain | ModuleKind::SolanaSpl => BlockChainType::Solana,
			ModuleKind::FilecoinMain => BlockChainType::Filecoin,
			ModuleKind::RippleMain => BlockChainType::Ripple,
			ModuleKind::StellarMain => BlockChainType::Stellar,
			ModuleKind::StarknetMain => BlockChainType::StarkNet,
			ModuleKind::TvmMain => BlockChainType::TVM,
		}
	}
}

/// One module entry of a network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
	pub kind: ModuleKind,
	/// Defaults to `{network_slug}-{kind}`
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub options: serde_json::Map<String, serde_json::Value>,
}

impl ModuleConfig {
	pub fn new(kind: ModuleKind) -> Self {
		Self {
			kind,
			name: None,
			options: serde_json::Map::new(),
		}
	}

	pub fn resolved_name(&self, network_slug: &str) -> String {
		self.name
			.clone()
			.unwrap_or_else(|| format!("{}-{}", network_slug, self.kind))
	}

	/// Parses the module options into their typed form.
	pub fn parse_options<T: DeserializeOwned>(&self) -> Result<T, IndexerError> {
		serde_json::from_value(serde_json::Value::Object(self.options.clone())).map_err(|e| {
			IndexerError::developer_error(
				format!("invalid options for module {}: {}", self.kind, e),
				Some(Box::new(e)),
				Some(HashMap::from([("module".to_string(), self.kind.to_string())])),
			)
		})
	}
}

/// Static capabilities a module declares to the processor
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDescriptor {
	pub name: String,
	pub kind: ModuleKind,
	/// Present iff events carry a `currency`
	pub currency_format: Option<CurrencyFormat>,
	pub ignore_sum_of_all_effects: bool,
	pub allow_empty_events: bool,
	pub mempool_support: bool,
	/// Every value `Event::extra` may take
	pub extra_vocabulary: Vec<&'static str>,
	/// Whether events carry `extra_indexed`
	pub extra_indexed: bool,
}

impl ModuleDescriptor {
	pub fn new(name: impl Into<String>, kind: ModuleKind) -> Self {
		Self {
			name: name.into(),
			kind,
			currency_format: None,
			ignore_sum_of_all_effects: false,
			allow_empty_events: true,
			mempool_support: false,
			extra_vocabulary: Vec::new(),
			extra_indexed: false,
		}
	}

	pub fn with_currency_format(mut self, format: CurrencyFormat) -> Self {
		self.currency_format = Some(format);
		self
	}

	pub fn with_extra_vocabulary(mut self, vocabulary: Vec<&'static str>) -> Self {
		self.extra_vocabulary = vocabulary;
		self
	}

	pub fn with_mempool_support(mut self) -> Self {
		self.mempool_support = true;
		self
	}

	pub fn with_extra_indexed(mut self) -> Self {
		self.extra_indexed = true;
		self
	}

	pub fn ignoring_sum_of_all_effects(mut self) -> Self {
		self.ignore_sum_of_all_effects = true;
		self
	}

	pub fn requiring_events(mut self) -> Self {
		self.allow_empty_events = false;
		self
	}
}
