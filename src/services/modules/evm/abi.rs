//! ABI helpers for token logs and metadata calls.
//!
//! This module provides the event topics and function selectors the token modules use,
//! and decoding of the values they read back from logs and `eth_call` results.

use alloy::{
	dyn_abi::{DynSolType, DynSolValue},
	primitives::{keccak256, Address, B256, U256},
};

use crate::models::blockchain::evm::format_hash;

pub const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";
pub const TRANSFER_SINGLE_EVENT: &str = "TransferSingle(address,address,address,uint256,uint256)";
pub const TRANSFER_BATCH_EVENT: &str = "TransferBatch(address,address,address,uint256[],uint256[])";

pub const NAME_FUNCTION: &str = "name()";
pub const SYMBOL_FUNCTION: &str = "symbol()";
pub const DECIMALS_FUNCTION: &str = "decimals()";
pub const BALANCE_OF_FUNCTION: &str = "balanceOf(address)";

/// Node error messages meaning "the contract does not implement this", not a node failure
const TOLERATED_REVERTS: [&str; 6] = [
	"execution reverted",
	"invalid opcode",
	"out of gas",
	"revert",
	"stack underflow",
	"invalid jump destination",
];

/// Computes the topic of an event signature.
///
/// # Arguments
/// * `signature` - Canonical event signature, e.g. `Transfer(address,address,uint256)`
///
/// # Returns
/// The `0x`-prefixed keccak-256 hash of the signature
pub fn event_topic(signature: &str) -> String {
	format_hash(&keccak256(signature.as_bytes()))
}

/// Builds `eth_call` input data for a function taking `args`.
///
/// # Arguments
/// * `signature` - Canonical function signature, e.g. `balanceOf(address)`
/// * `args` - Arguments in declaration order
///
/// # Returns
/// The `0x`-prefixed selector followed by the ABI-encoded arguments
pub fn call_data(signature: &str, args: Vec<DynSolValue>) -> String {
	let hash = keccak256(signature.as_bytes());
	let selector = &hash[..4];
	let encoded = if args.is_empty() {
		Vec::new()
	} else {
		DynSolValue::Tuple(args).abi_encode_params()
	};
	format!("0x{}{}", hex::encode(selector), hex::encode(encoded))
}

/// Address stored in an indexed topic
pub fn topic_address(topic: &B256) -> Address {
	Address::from_slice(&topic[12..])
}

/// Integer stored in an indexed topic
pub fn topic_uint(topic: &B256) -> U256 {
	U256::from_be_bytes(topic.0)
}

/// A single `uint256` word, `None` if `data` is not exactly one word
pub fn decode_uint(data: &[u8]) -> Option<U256> {
	(data.len() == 32).then(|| U256::from_be_slice(data))
}

/// `(id, value)` pairs of a `TransferSingle` body
pub fn decode_single(data: &[u8]) -> Option<(U256, U256)> {
	if data.len() != 64 {
		return None;
	}
	Some((
		U256::from_be_slice(&data[..32]),
		U256::from_be_slice(&data[32..]),
	))
}

/// `(id, value)` pairs of a `TransferBatch` body
pub fn decode_batch(data: &[u8]) -> Option<Vec<(U256, U256)>> {
	let body_type = DynSolType::Tuple(vec![
		DynSolType::Array(Box::new(DynSolType::Uint(256))),
		DynSolType::Array(Box::new(DynSolType::Uint(256))),
	]);
	let DynSolValue::Tuple(mut fields) = body_type.abi_decode_params(data).ok()? else {
		return None;
	};
	if fields.len() != 2 {
		return None;
	}
	let values = uint_array(fields.pop()?)?;
	let ids = uint_array(fields.pop()?)?;
	(ids.len() == values.len()).then(|| ids.into_iter().zip(values).collect())
}

fn uint_array(value: DynSolValue) -> Option<Vec<U256>> {
	match value {
		DynSolValue::Array(items) => items
			.into_iter()
			.map(|item| match item {
				DynSolValue::Uint(number, _) => Some(number),
				_ => None,
			})
			.collect(),
		_ => None,
	}
}

/// Decodes a `string` return value, falling back to a `bytes32` one.
///
/// # Arguments
/// * `data` - Raw `eth_call` result
///
/// # Returns
/// The trimmed text, or `None` when the value is empty or not text
pub fn decode_text(data: &[u8]) -> Option<String> {
	if data.is_empty() {
		return None;
	}
	let returns = DynSolType::Tuple(vec![DynSolType::String]);
	if let Ok(DynSolValue::Tuple(fields)) = returns.abi_decode_params(data) {
		if let Some(DynSolValue::String(text)) = fields.first() {
			let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
			return (!text.is_empty()).then(|| text.to_string());
		}
	}
	if data.len() == 32 {
		let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
		let text = std::str::from_utf8(&data[..end]).ok()?.trim();
		return (!text.is_empty()).then(|| text.to_string());
	}
	None
}

/// Decodes a `uint8 decimals()` return value
pub fn decode_decimals(data: &[u8]) -> Option<u32> {
	let value = decode_uint(data)?;
	(value <= U256::from(u32::MAX)).then(|| value.to::<u32>())
}

/// Bytes of a `0x`-prefixed hex string
pub fn hex_bytes(value: &str) -> Option<Vec<u8>> {
	let digits = value.strip_prefix("0x").unwrap_or(value);
	hex::decode(digits).ok()
}

pub fn is_tolerated_revert(message: &str) -> bool {
	let message = message.to_ascii_lowercase();
	TOLERATED_REVERTS.iter().any(|revert| message.contains(revert))
}
