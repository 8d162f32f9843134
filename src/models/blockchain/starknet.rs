//! StarkNet JSON-RPC response shapes.
//!
//! Field elements arrive as `0x` hex strings with or without leading zeros; compare them
//! only after [`normalize_felt`].

use serde::{Deserialize, Serialize};

use crate::utils::decimal::{self, DecimalError};

/// Result of `starknet_getBlockWithTxHashes`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StarknetBlock {
	/// Absent while the block is pending
	#[serde(default)]
	pub block_hash: Option<String>,
	#[serde(default)]
	pub block_number: Option<u64>,
	#[serde(default)]
	pub status: Option<String>,
	/// Unix seconds
	pub timestamp: i64,
	pub sequencer_address: String,
	#[serde(default)]
	pub transactions: Vec<String>,
}

impl StarknetBlock {
	pub fn is_pending(&self) -> bool {
		self.block_hash.is_none() || self.status.as_deref() == Some("PENDING")
	}
}

/// One page of `starknet_getEvents`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StarknetEventsPage {
	pub events: Vec<StarknetEmittedEvent>,
	#[serde(default)]
	pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StarknetEmittedEvent {
	pub from_address: String,
	pub keys: Vec<String>,
	pub data: Vec<String>,
	#[serde(default)]
	pub block_hash: Option<String>,
	#[serde(default)]
	pub block_number: Option<u64>,
	pub transaction_hash: String,
}

/// Decoded ERC-20 `Transfer`
#[derive(Debug, Clone, PartialEq)]
pub struct StarknetTransfer<'a> {
	pub from: &'a str,
	pub to: &'a str,
	pub low: &'a str,
	pub high: &'a str,
}

impl StarknetEmittedEvent {
	/// `Transfer` fields in either layout: Cairo 0 contracts put every field in `data`,
	/// Cairo 1 contracts index the two parties as keys.
	pub fn transfer(&self) -> Option<StarknetTransfer<'_>> {
		match (self.keys.as_slice(), self.data.as_slice()) {
			([_, from, to], [low, high]) => Some(StarknetTransfer { from, to, low, high }),
			([_], [from, to, low, high]) => Some(StarknetTransfer { from, to, low, high }),
			_ => None,
		}
	}
}

/// Lowercase `0x` form padded to 64 digits
pub fn normalize_felt(value: &str) -> Result<String, DecimalError> {
	let felt = decimal::parse_hex(value)?;
	Ok(format!("0x{:0>64}", felt.to_str_radix(16)))
}

/// Joins the two 128-bit halves of a `u256`
pub fn u256_from_halves(low: &str, high: &str) -> Result<num_bigint::BigInt, DecimalError> {
	Ok(decimal::parse_hex(low)? + (decimal::parse_hex(high)? << 128))
}
