//! EVM receipt and log data structures.

use alloy::primitives::{Address, Bytes, B256, U256, U64};
use serde::{Deserialize, Serialize};

/// Receipt as returned by `eth_getBlockReceipts` and `eth_getTransactionReceipt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EVMTransactionReceipt {
	/// Transaction hash.
	#[serde(rename = "transactionHash")]
	pub transaction_hash: B256,
	/// Index within the block.
	#[serde(rename = "transactionIndex")]
	pub transaction_index: U64,
	/// Sender
	pub from: Address,
	/// Recipient (None when contract creation)
	#[serde(default)]
	pub to: Option<Address>,
	/// Gas used by this transaction alone.
	#[serde(rename = "gasUsed")]
	pub gas_used: U256,
	/// Price actually paid per unit of gas
	#[serde(rename = "effectiveGasPrice", default)]
	pub effective_gas_price: Option<U256>,
	/// Contract address created, or `None` if not a deployment.
	#[serde(rename = "contractAddress", default)]
	pub contract_address: Option<Address>,
	/// Status: either 1 (success) or 0 (failure). Absent before Byzantium.
	#[serde(default)]
	pub status: Option<U64>,
	/// Logs generated within this transaction.
	#[serde(default)]
	pub logs: Vec<EVMReceiptLog>,
}

impl EVMTransactionReceipt {
	pub fn is_failed(&self) -> bool {
		self.status.is_some_and(|status| status.is_zero())
	}
}

/// Log entry from a receipt or from `eth_getLogs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EVMReceiptLog {
	/// Emitting contract
	pub address: Address,
	/// Indexed topics, signature first
	pub topics: Vec<B256>,
	/// Non-indexed data
	pub data: Bytes,
	#[serde(rename = "blockNumber", default)]
	pub block_number: Option<U64>,
	#[serde(rename = "transactionHash", default)]
	pub transaction_hash: Option<B256>,
	#[serde(rename = "transactionIndex", default)]
	pub transaction_index: Option<U64>,
	#[serde(rename = "logIndex", default)]
	pub log_index: Option<U64>,
	/// Set by nodes for logs of reorged blocks
	#[serde(default)]
	pub removed: bool,
}

impl EVMReceiptLog {
	/// Position used to order logs within a block
	pub fn position(&self) -> (u64, u64) {
		(
			self.transaction_index.map(|i| i.to::<u64>()).unwrap_or(u64::MAX),
			self.log_index.map(|i| i.to::<u64>()).unwrap_or(u64::MAX),
		)
	}
}
