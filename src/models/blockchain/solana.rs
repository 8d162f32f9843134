//! Solana JSON-RPC response shapes (`getBlock` with `json` encoding).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaBlock {
	pub blockhash: String,
	pub previous_blockhash: String,
	pub parent_slot: u64,
	/// Unix seconds, absent for very old slots
	#[serde(default)]
	pub block_time: Option<i64>,
	#[serde(default)]
	pub transactions: Vec<SolanaTransactionWithMeta>,
	#[serde(default)]
	pub rewards: Vec<SolanaReward>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SolanaTransactionWithMeta {
	pub transaction: SolanaTransaction,
	pub meta: Option<SolanaTransactionMeta>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SolanaTransaction {
	pub signatures: Vec<String>,
	pub message: SolanaMessage,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaMessage {
	pub account_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaTransactionMeta {
	#[serde(default)]
	pub err: Option<Value>,
	pub fee: u64,
	pub pre_balances: Vec<u64>,
	pub post_balances: Vec<u64>,
	#[serde(default)]
	pub pre_token_balances: Option<Vec<SolanaTokenBalance>>,
	#[serde(default)]
	pub post_token_balances: Option<Vec<SolanaTokenBalance>>,
	#[serde(default)]
	pub loaded_addresses: Option<SolanaLoadedAddresses>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SolanaLoadedAddresses {
	#[serde(default)]
	pub writable: Vec<String>,
	#[serde(default)]
	pub readonly: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaTokenBalance {
	pub account_index: usize,
	pub mint: String,
	#[serde(default)]
	pub owner: Option<String>,
	pub ui_token_amount: SolanaTokenAmount,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SolanaTokenAmount {
	/// Raw amount in base units
	pub amount: String,
	pub decimals: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaReward {
	pub pubkey: String,
	/// Negative for rent collection
	pub lamports: i64,
	#[serde(default)]
	pub reward_type: Option<String>,
}

impl SolanaTransactionWithMeta {
	/// Static keys followed by writable then read-only loaded addresses
	pub fn account_keys(&self) -> Vec<String> {
		let mut keys = self.transaction.message.account_keys.clone();
		if let Some(loaded) = self
			.meta
			.as_ref()
			.and_then(|meta| meta.loaded_addresses.as_ref())
		{
			keys.extend(loaded.writable.iter().cloned());
			keys.extend(loaded.readonly.iter().cloned());
		}
		keys
	}

	pub fn signature(&self) -> Option<&str> {
		self.transaction.signatures.first().map(String::as_str)
	}

	pub fn is_failed(&self) -> bool {
		self.meta
			.as_ref()
			.is_some_and(|meta| meta.err.as_ref().is_some_and(|err| !err.is_null()))
	}
}
