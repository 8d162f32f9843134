//! Lotus JSON-RPC response shapes.

use serde::{Deserialize, Serialize};

/// IPLD link, `{"/": "bafy..."}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilecoinCid {
	#[serde(rename = "/")]
	pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilecoinTipSet {
	pub cids: Vec<FilecoinCid>,
	pub blocks: Vec<FilecoinBlockHeader>,
	pub height: u64,
}

impl FilecoinTipSet {
	pub fn cid_strings(&self) -> Vec<String> {
		self.cids.iter().map(|cid| cid.cid.clone()).collect()
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilecoinBlockHeader {
	pub miner: String,
	/// Unix seconds
	pub timestamp: i64,
	/// Base fee applying to the messages included in this tipset, attoFIL
	pub parent_base_fee: String,
	#[serde(default)]
	pub parents: Vec<FilecoinCid>,
}

/// Entry of `Filecoin.ChainGetParentMessages`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilecoinParentMessage {
	pub cid: FilecoinCid,
	pub message: FilecoinMessage,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilecoinMessage {
	pub from: String,
	pub to: String,
	/// attoFIL
	pub value: String,
	pub gas_limit: i64,
	pub gas_fee_cap: String,
	pub gas_premium: String,
	#[serde(default)]
	pub method: u64,
}

/// Response of `Filecoin.ChainGetBlockMessages`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilecoinBlockMessages {
	/// Every message of the block, BLS messages first
	#[serde(default)]
	pub cids: Vec<FilecoinCid>,
}

/// Entry of `Filecoin.ChainGetParentReceipts`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilecoinReceipt {
	pub exit_code: i64,
	pub gas_used: i64,
}
