//! Substrate API Sidecar response shapes (`GET /blocks/{n}`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubstrateBlock {
	/// Block number as a decimal string
	pub number: String,
	pub hash: String,
	#[serde(rename = "parentHash", default)]
	pub parent_hash: Option<String>,
	#[serde(rename = "authorId", default)]
	pub author_id: Option<String>,
	#[serde(rename = "onInitialize", default)]
	pub on_initialize: SubstrateHook,
	#[serde(default)]
	pub extrinsics: Vec<SubstrateExtrinsic>,
	#[serde(rename = "onFinalize", default)]
	pub on_finalize: SubstrateHook,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SubstrateHook {
	#[serde(default)]
	pub events: Vec<SubstrateEvent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubstrateMethod {
	pub pallet: String,
	pub method: String,
}

impl SubstrateMethod {
	pub fn is(&self, pallet: &str, method: &str) -> bool {
		self.pallet == pallet && self.method == method
	}
}

/// A call nested in the arguments of a batch, multisig or proxy extrinsic
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubstrateCall {
	pub method: SubstrateMethod,
	#[serde(default)]
	pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubstrateExtrinsic {
	pub method: SubstrateMethod,
	#[serde(default)]
	pub hash: Option<String>,
	#[serde(default)]
	pub args: Value,
	#[serde(default)]
	pub events: Vec<SubstrateEvent>,
	pub success: bool,
	#[serde(rename = "paysFee", default)]
	pub pays_fee: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubstrateEvent {
	pub method: SubstrateMethod,
	/// Positional event fields
	#[serde(default)]
	pub data: Vec<Value>,
}

impl SubstrateEvent {
	/// Positional field rendered as a string; numbers and strings are accepted.
	pub fn field(&self, index: usize) -> Option<String> {
		match self.data.get(index)? {
			Value::String(value) => Some(value.clone()),
			Value::Number(value) => Some(value.to_string()),
			Value::Object(map) => map
				.get("id")
				.and_then(Value::as_str)
				.map(str::to_string),
			_ => None,
		}
	}
}

/// Response of `GET /accounts/{address}/balance-info`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubstrateBalanceInfo {
	pub free: String,
}
