//! Bitcoin Core style node response shapes (`getblock` verbosity 3, `getrawtransaction` verbosity 2).
//!
//! Output values are decimal coin amounts and are kept as [`serde_json::Number`] so the
//! original digits survive until they are scaled to integers.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Block with transactions and their previous outputs inline
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UtxoBlock {
	pub hash: String,
	pub height: u64,
	/// Unix timestamp in seconds
	pub time: i64,
	#[serde(rename = "nTx")]
	pub n_tx: usize,
	pub tx: Vec<UtxoTransaction>,
}

/// Header as returned by `getblockheader` (verbose)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UtxoBlockHeader {
	pub hash: String,
	pub height: u64,
	pub time: i64,
	#[serde(rename = "nTx")]
	pub n_tx: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UtxoTransaction {
	pub txid: String,
	pub vin: Vec<UtxoInput>,
	pub vout: Vec<UtxoOutput>,
	/// Sprout transfers of Zcash style chains
	#[serde(rename = "vjoinsplit", default)]
	pub joinsplits: Vec<UtxoJoinSplit>,
	#[serde(rename = "vShieldedSpend", default)]
	pub shielded_spends: Vec<Value>,
	#[serde(rename = "vShieldedOutput", default)]
	pub shielded_outputs: Vec<Value>,
	/// Net Sapling value leaving the pool, in base units
	#[serde(rename = "valueBalanceZat", default)]
	pub value_balance: i64,
	#[serde(default)]
	pub orchard: Option<UtxoOrchardBundle>,
}

impl UtxoTransaction {
	pub fn is_coinbase(&self) -> bool {
		self.vin.iter().any(|input| input.coinbase.is_some())
	}

	/// Whether notes of a shielded pool are spent
	pub fn spends_shielded(&self) -> bool {
		!self.joinsplits.is_empty()
			|| !self.shielded_spends.is_empty()
			|| self.orchard.as_ref().is_some_and(|bundle| !bundle.actions.is_empty())
	}

	/// Whether notes of a shielded pool are created
	pub fn creates_shielded(&self) -> bool {
		!self.joinsplits.is_empty()
			|| !self.shielded_outputs.is_empty()
			|| self.orchard.as_ref().is_some_and(|bundle| !bundle.actions.is_empty())
	}

	/// Net value moved from every shielded pool into the transparent one, in base units
	pub fn shielded_balance(&self) -> i128 {
		let sprout: i128 = self
			.joinsplits
			.iter()
			.map(|split| i128::from(split.vpub_new) - i128::from(split.vpub_old))
			.sum();
		let orchard = self.orchard.as_ref().map(|bundle| bundle.value_balance).unwrap_or_default();
		sprout + i128::from(self.value_balance) + i128::from(orchard)
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UtxoJoinSplit {
	#[serde(rename = "vpub_oldZat")]
	pub vpub_old: i64,
	#[serde(rename = "vpub_newZat")]
	pub vpub_new: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UtxoOrchardBundle {
	#[serde(default)]
	pub actions: Vec<Value>,
	#[serde(rename = "valueBalanceZat", default)]
	pub value_balance: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UtxoInput {
	/// Present only on the coinbase input
	#[serde(default)]
	pub coinbase: Option<String>,
	#[serde(default)]
	pub txid: Option<String>,
	#[serde(default)]
	pub vout: Option<u32>,
	/// The spent output, included by verbosity 3 blocks and verbosity 2 transactions
	#[serde(default)]
	pub prevout: Option<UtxoPrevout>,
	/// Spent value inlined by address-indexing nodes that lack `prevout`
	#[serde(default)]
	pub value: Option<Number>,
	/// Owner of the spent output on the same nodes
	#[serde(default)]
	pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UtxoPrevout {
	pub value: Number,
	#[serde(rename = "scriptPubKey")]
	pub script_pub_key: UtxoScriptPubKey,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UtxoOutput {
	pub value: Number,
	pub n: u32,
	#[serde(rename = "scriptPubKey")]
	pub script_pub_key: UtxoScriptPubKey,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UtxoScriptPubKey {
	#[serde(default)]
	pub hex: String,
	/// Single address field of Bitcoin Core 22+
	#[serde(default)]
	pub address: Option<String>,
	/// Address list of older nodes and most forks
	#[serde(default)]
	pub addresses: Option<Vec<String>>,
	#[serde(rename = "type", default)]
	pub script_type: Option<String>,
}

impl UtxoScriptPubKey {
	/// The owning address, when the script has a standard one
	pub fn owner(&self) -> Option<&str> {
		self.address.as_deref().or_else(|| {
			self.addresses
				.as_ref()
				.and_then(|addresses| addresses.first())
				.map(String::as_str)
		})
	}
}
