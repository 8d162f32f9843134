//! Blockchain-specific node response shapes.
//!
//! One submodule per chain family. These types mirror what the nodes return and carry
//! no indexing logic beyond small accessors.

use serde::{Deserialize, Serialize};

pub mod beacon;
pub mod cosmos;
pub mod evm;
pub mod filecoin;
pub mod ripple;
pub mod solana;
pub mod starknet;
pub mod stellar;
pub mod substrate;
pub mod tron;
pub mod utxo;

/// Supported chain families
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields)]
pub enum BlockChainType {
	/// Ethereum Virtual Machine based chains (execution layer)
	EVM,
	/// Bitcoin and its forks
	UTXO,
	/// Polkadot SDK chains served through Substrate API Sidecar
	Substrate,
	/// Ethereum consensus layer
	Beacon,
	/// Cosmos SDK chains
	Cosmos,
	Solana,
	Filecoin,
	Ripple,
	/// Stellar through Horizon
	Stellar,
	StarkNet,
	/// Tron virtual machine chains through the full node HTTP API
	TVM,
}
