//! EVM block data structures.

use alloy::primitives::{Address, B256, U256, U64};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::EVMTransaction;

/// Block as returned by `eth_getBlockByNumber`
///
/// `TX` is [`EVMTransaction`] when full transactions are requested and [`B256`] when
/// only hashes are.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EVMBlock<TX = EVMTransaction> {
	/// Hash of the block
	pub hash: B256,
	/// Hash of the parent
	#[serde(rename = "parentHash")]
	pub parent_hash: B256,
	/// Block number
	pub number: U64,
	/// Unix timestamp in seconds
	pub timestamp: U64,
	/// Miner/author's address
	#[serde(default)]
	pub miner: Address,
	/// Base fee per unit of gas (if past London)
	#[serde(rename = "baseFeePerGas", default)]
	pub base_fee_per_gas: Option<U256>,
	/// Transactions, full objects or hashes
	pub transactions: Vec<TX>,
	/// Validator withdrawals (if past Shanghai)
	#[serde(default)]
	pub withdrawals: Option<Vec<EVMWithdrawal>>,
	/// Hashes of included uncle headers
	#[serde(default)]
	pub uncles: Vec<B256>,
}

impl<TX> EVMBlock<TX> {
	pub fn number(&self) -> u64 {
		self.number.to::<u64>()
	}

	pub fn timestamp(&self) -> u64 {
		self.timestamp.to::<u64>()
	}
}

/// Uncle header as returned by `eth_getUncleByBlockNumberAndIndex`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EVMUncle {
	pub number: U64,
	pub miner: Address,
}

impl EVMUncle {
	pub fn number(&self) -> u64 {
		self.number.to::<u64>()
	}
}

/// Consensus-layer withdrawal credited by the execution layer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EVMWithdrawal {
	pub index: U64,
	#[serde(rename = "validatorIndex")]
	pub validator_index: U64,
	pub address: Address,
	/// Amount in gwei
	pub amount: U64,
}

/// Content of `txpool_content`: sender address to nonce to transaction
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EVMTxPoolContent {
	#[serde(default)]
	pub pending: BTreeMap<String, BTreeMap<String, EVMTransaction>>,
	#[serde(default)]
	pub queued: BTreeMap<String, BTreeMap<String, EVMTransaction>>,
}

impl EVMTxPoolContent {
	/// Pending transactions ordered by sender then numeric nonce
	pub fn pending_transactions(&self) -> Vec<&EVMTransaction> {
		let mut transactions = Vec::new();
		for by_nonce in self.pending.values() {
			let mut entries: Vec<(u64, &EVMTransaction)> = by_nonce
				.iter()
				.map(|(nonce, tx)| (nonce.parse::<u64>().unwrap_or(u64::MAX), tx))
				.collect();
			entries.sort_by_key(|(nonce, _)| *nonce);
			transactions.extend(entries.into_iter().map(|(_, tx)| tx));
		}
		transactions
	}
}
