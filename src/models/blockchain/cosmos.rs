//! CometBFT RPC and Cosmos SDK REST response shapes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// JSON-RPC envelope CometBFT wraps around its HTTP GET responses
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CometResponse<T> {
	pub result: T,
}

/// `GET /block?height=n`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosBlockResponse {
	pub block_id: CosmosBlockId,
	pub block: CosmosBlock,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosBlockId {
	pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosBlock {
	pub header: CosmosHeader,
	pub data: CosmosBlockData,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosHeader {
	pub height: String,
	/// RFC 3339 with nanoseconds
	pub time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CosmosBlockData {
	/// Base64-encoded raw transactions
	#[serde(default)]
	pub txs: Option<Vec<String>>,
}

/// `GET /block_results?height=n`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosBlockResults {
	pub height: String,
	#[serde(default)]
	pub txs_results: Option<Vec<CosmosTxResult>>,
	#[serde(default)]
	pub begin_block_events: Option<Vec<CosmosEvent>>,
	#[serde(default)]
	pub end_block_events: Option<Vec<CosmosEvent>>,
	/// CometBFT 0.38+ replacement of begin/end block events
	#[serde(default)]
	pub finalize_block_events: Option<Vec<CosmosEvent>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosTxResult {
	#[serde(default)]
	pub code: u32,
	#[serde(default)]
	pub events: Vec<CosmosEvent>,
}

impl CosmosTxResult {
	pub fn is_failed(&self) -> bool {
		self.code != 0
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosEvent {
	#[serde(rename = "type")]
	pub event_type: String,
	#[serde(default)]
	pub attributes: Vec<CosmosAttribute>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosAttribute {
	pub key: String,
	#[serde(default)]
	pub value: Option<String>,
}

impl CosmosEvent {
	/// Decodes base64 attributes of pre-0.38 nodes in place.
	///
	/// Nodes either encode every attribute or none, so the event is decoded only when
	/// every key decodes to printable UTF-8.
	pub fn decode_attributes(&mut self) {
		let decoded: Option<Vec<CosmosAttribute>> = self
			.attributes
			.iter()
			.map(|attribute| {
				let key = decode_base64_text(&attribute.key)?;
				let value = match &attribute.value {
					Some(value) => Some(decode_base64_text(value)?),
					None => None,
				};
				Some(CosmosAttribute { key, value })
			})
			.collect();
		if let Some(attributes) = decoded {
			if !attributes.is_empty() {
				self.attributes = attributes;
			}
		}
	}

	pub fn attribute(&self, key: &str) -> Option<&str> {
		self.attributes
			.iter()
			.find(|attribute| attribute.key == key)
			.and_then(|attribute| attribute.value.as_deref())
	}
}

fn decode_base64_text(value: &str) -> Option<String> {
	if value.is_empty() {
		return Some(String::new());
	}
	let bytes = STANDARD.decode(value).ok()?;
	let text = String::from_utf8(bytes).ok()?;
	text.chars()
		.all(|c| !c.is_control())
		.then_some(text)
}

/// `GET /cosmos/bank/v1beta1/denoms_metadata/{denom}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosDenomMetadataResponse {
	pub metadata: CosmosDenomMetadata,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosDenomMetadata {
	pub base: String,
	#[serde(default)]
	pub display: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub symbol: String,
	#[serde(default)]
	pub denom_units: Vec<CosmosDenomUnit>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosDenomUnit {
	pub denom: String,
	#[serde(default)]
	pub exponent: u32,
}

impl CosmosDenomMetadata {
	/// Exponent of the display unit, 0 when the display unit is not listed
	pub fn decimals(&self) -> u32 {
		self.denom_units
			.iter()
			.find(|unit| unit.denom == self.display)
			.map(|unit| unit.exponent)
			.unwrap_or(0)
	}
}

/// `GET /cosmos/bank/v1beta1/balances/{address}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosBalancesResponse {
	pub balances: Vec<CosmosCoin>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CosmosCoin {
	pub denom: String,
	pub amount: String,
}
