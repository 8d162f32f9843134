//! Tron full node HTTP API response shapes (`/wallet/*`, requested with `visible: true`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Leading byte of every mainnet account address
const ADDRESS_PREFIX: &str = "41";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronBlock {
	/// Missing, like the header, when the node does not have the block yet
	#[serde(rename = "blockID", default)]
	pub block_id: Option<String>,
	#[serde(default)]
	pub block_header: Option<TronBlockHeader>,
	#[serde(default)]
	pub transactions: Vec<TronTransaction>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronBlockHeader {
	pub raw_data: TronBlockRawData,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronBlockRawData {
	/// Omitted for the genesis block
	#[serde(default)]
	pub number: u64,
	/// Unix milliseconds
	#[serde(default)]
	pub timestamp: i64,
	#[serde(default)]
	pub witness_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronTransaction {
	#[serde(rename = "txID")]
	pub tx_id: String,
	pub raw_data: TronTransactionRawData,
	#[serde(default)]
	pub ret: Vec<TronResult>,
}

impl TronTransaction {
	pub fn is_success(&self) -> bool {
		self.ret
			.first()
			.and_then(|ret| ret.contract_ret.as_deref())
			.is_none_or(|ret| ret == "SUCCESS")
	}

	pub fn contract(&self) -> Option<&TronContract> {
		self.raw_data.contract.first()
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronTransactionRawData {
	#[serde(default)]
	pub contract: Vec<TronContract>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronContract {
	#[serde(rename = "type")]
	pub contract_type: String,
	pub parameter: TronContractParameter,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronContractParameter {
	/// Shape depends on the contract type
	pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronResult {
	#[serde(rename = "contractRet", default)]
	pub contract_ret: Option<String>,
}

/// `TransferContract`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TronTransferValue {
	pub owner_address: String,
	pub to_address: String,
	pub amount: i64,
}

/// `TriggerSmartContract`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TronTriggerValue {
	pub owner_address: String,
	pub contract_address: String,
	#[serde(default)]
	pub call_value: i64,
}

/// `FreezeBalanceV2Contract`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TronFreezeValue {
	pub owner_address: String,
	pub frozen_balance: i64,
}

/// Contracts whose amount is only known from the execution result
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TronOwnerValue {
	pub owner_address: String,
}

/// Entry of `/wallet/gettransactioninfobyblocknum`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronTransactionInfo {
	pub id: String,
	/// Burnt TRX in sun, energy and bandwidth included
	#[serde(default)]
	pub fee: i64,
	#[serde(default)]
	pub withdraw_amount: i64,
	#[serde(default)]
	pub withdraw_expire_amount: i64,
	#[serde(default)]
	pub internal_transactions: Vec<TronInternalTransaction>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronInternalTransaction {
	pub caller_address: String,
	#[serde(rename = "transferTo_address")]
	pub transfer_to_address: String,
	#[serde(rename = "callValueInfo", default)]
	pub call_value_info: Vec<TronCallValue>,
	#[serde(default)]
	pub rejected: bool,
}

impl TronInternalTransaction {
	/// TRX moved by the call; TRC-10 values are skipped
	pub fn trx_value(&self) -> i64 {
		self.call_value_info
			.iter()
			.filter(|value| value.token_id.is_none())
			.map(|value| value.call_value)
			.sum()
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronCallValue {
	#[serde(rename = "callValue", default)]
	pub call_value: i64,
	#[serde(rename = "tokenId", default)]
	pub token_id: Option<String>,
}

/// `/wallet/getaccount`, an empty object for accounts that were never activated
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TronAccount {
	#[serde(default)]
	pub balance: i64,
}

/// Base58Check form of a `41…` hex address; other values are returned unchanged.
///
/// Transaction info keeps hex addresses even when the request asked for visible ones.
pub fn tron_address(address: &str) -> String {
	if address.len() != 42 || !address.starts_with(ADDRESS_PREFIX) {
		return address.to_string();
	}
	match hex::decode(address) {
		Ok(bytes) => {
			let checksum = Sha256::digest(Sha256::digest(&bytes));
			let mut payload = bytes;
			payload.extend_from_slice(&checksum[..4]);
			bs58::encode(payload).into_string()
		}
		Err(_) => address.to_string(),
	}
}
