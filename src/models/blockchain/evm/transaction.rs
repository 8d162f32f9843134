//! EVM transaction data structures.

use alloy::primitives::{Address, Bytes, B256, U256, U64};
use serde::{Deserialize, Serialize};

/// Transaction object embedded in full blocks and in `txpool_content`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EVMTransaction {
	/// Hash
	pub hash: B256,
	/// Sender
	pub from: Address,
	/// Recipient (None when contract creation)
	#[serde(default)]
	pub to: Option<Address>,
	/// Transferred value
	pub value: U256,
	/// Gas Price
	#[serde(rename = "gasPrice", default)]
	pub gas_price: Option<U256>,
	/// Transaction Index. None when pending.
	#[serde(rename = "transactionIndex", default)]
	pub transaction_index: Option<U64>,
	/// Input data
	#[serde(default)]
	pub input: Bytes,
}

impl EVMTransaction {
	pub fn is_contract_creation(&self) -> bool {
		self.to.is_none()
	}
}
