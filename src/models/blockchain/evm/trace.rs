//! Call traces from `debug_traceBlockByNumber` and `trace_block`.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Per-transaction result of `debug_traceBlockByNumber` with the `callTracer`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EVMTraceResult {
	#[serde(rename = "txHash", default)]
	pub tx_hash: Option<B256>,
	pub result: EVMCallFrame,
}

/// One frame of a `callTracer` call tree
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EVMCallFrame {
	/// Upper-case call type (`CALL`, `CREATE2`, `SELFDESTRUCT`, ...)
	#[serde(rename = "type")]
	pub call_type: String,
	pub from: Address,
	#[serde(default)]
	pub to: Option<Address>,
	#[serde(default)]
	pub value: Option<U256>,
	/// Set when the frame reverted
	#[serde(default)]
	pub error: Option<String>,
	#[serde(default)]
	pub calls: Vec<EVMCallFrame>,
}

/// One flat entry of `trace_block` (OpenEthereum/Erigon format)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EVMParityTrace {
	pub action: EVMParityAction,
	#[serde(default)]
	pub result: Option<EVMParityResult>,
	#[serde(default)]
	pub error: Option<String>,
	#[serde(rename = "traceAddress", default)]
	pub trace_address: Vec<u64>,
	#[serde(rename = "transactionHash", default)]
	pub transaction_hash: Option<B256>,
	/// `call`, `create`, `suicide` or `reward`
	#[serde(rename = "type")]
	pub trace_type: String,
}

/// Union of the action shapes of every parity trace type
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EVMParityAction {
	#[serde(rename = "callType", default)]
	pub call_type: Option<String>,
	#[serde(default)]
	pub from: Option<Address>,
	#[serde(default)]
	pub to: Option<Address>,
	#[serde(default)]
	pub value: Option<U256>,
	/// Self-destructed contract
	#[serde(default)]
	pub address: Option<Address>,
	#[serde(rename = "refundAddress", default)]
	pub refund_address: Option<Address>,
	/// Balance moved by a self-destruct
	#[serde(default)]
	pub balance: Option<U256>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EVMParityResult {
	/// Created contract
	#[serde(default)]
	pub address: Option<Address>,
}
