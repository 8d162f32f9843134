//! rippled JSON-RPC response shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `ledger` method result
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RippleLedgerResponse {
	pub ledger: RippleLedger,
	#[serde(default)]
	pub validated: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RippleLedger {
	pub ledger_hash: String,
	/// Seconds since the Ripple epoch
	pub close_time: i64,
	#[serde(default)]
	pub transactions: Vec<RippleTransaction>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RippleTransaction {
	pub hash: String,
	#[serde(rename = "Account")]
	pub account: String,
	/// Drops
	#[serde(rename = "Fee")]
	pub fee: String,
	#[serde(rename = "TransactionType")]
	pub transaction_type: String,
	#[serde(rename = "metaData")]
	pub meta: RippleMeta,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RippleMeta {
	#[serde(rename = "TransactionIndex")]
	pub transaction_index: u64,
	#[serde(rename = "TransactionResult")]
	pub transaction_result: String,
	#[serde(rename = "AffectedNodes", default)]
	pub affected_nodes: Vec<RippleAffectedNode>,
}

impl RippleMeta {
	pub fn is_success(&self) -> bool {
		self.transaction_result == "tesSUCCESS"
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum RippleAffectedNode {
	CreatedNode(RippleLedgerNode),
	ModifiedNode(RippleLedgerNode),
	DeletedNode(RippleLedgerNode),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RippleLedgerNode {
	#[serde(rename = "LedgerEntryType")]
	pub ledger_entry_type: String,
	#[serde(rename = "FinalFields", default)]
	pub final_fields: Option<Map<String, Value>>,
	#[serde(rename = "PreviousFields", default)]
	pub previous_fields: Option<Map<String, Value>>,
	#[serde(rename = "NewFields", default)]
	pub new_fields: Option<Map<String, Value>>,
}

fn string_field<'a>(fields: &'a Option<Map<String, Value>>, key: &str) -> Option<&'a str> {
	fields.as_ref()?.get(key)?.as_str()
}

impl RippleAffectedNode {
	pub fn node(&self) -> &RippleLedgerNode {
		match self {
			RippleAffectedNode::CreatedNode(node)
			| RippleAffectedNode::ModifiedNode(node)
			| RippleAffectedNode::DeletedNode(node) => node,
		}
	}

	/// Account and XRP balance change in drops, for `AccountRoot` entries whose balance changed.
	///
	/// Returns `(account, previous, final)`; balances absent from a side count as zero.
	pub fn account_root_change(&self) -> Option<(&str, &str, &str)> {
		let node = self.node();
		if node.ledger_entry_type != "AccountRoot" {
			return None;
		}
		match self {
			RippleAffectedNode::CreatedNode(node) => {
				let account = string_field(&node.new_fields, "Account")?;
				let balance = string_field(&node.new_fields, "Balance")?;
				Some((account, "0", balance))
			}
			RippleAffectedNode::ModifiedNode(node) | RippleAffectedNode::DeletedNode(node) => {
				let account = string_field(&node.final_fields, "Account")?;
				let previous = string_field(&node.previous_fields, "Balance")?;
				let current = string_field(&node.final_fields, "Balance").unwrap_or("0");
				Some((account, previous, current))
			}
		}
	}
}

/// `account_info` method result
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RippleAccountInfo {
	#[serde(default)]
	pub account_data: Option<RippleAccountData>,
	#[serde(default)]
	pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RippleAccountData {
	#[serde(rename = "Balance")]
	pub balance: String,
}
