//! Sentinel addresses.
//!
//! These stand in for counterparties that have no chain-native address: minting and
//! burning, protocol-owned balances, pooled stake.

use sha2::{Digest, Sha256};

/// Source of minted value and destination of burnt value and destroyed fees
pub const THE_VOID: &str = "the-void";
/// Balances owned by the protocol itself
pub const THE_CONTRACT: &str = "the-contract";
pub const STAKING_POOL: &str = "staking-pool";
pub const TREASURY: &str = "treasury";
pub const OPERATIONS: &str = "operations";
pub const POOL: &str = "pool";

const SCRIPT_PREFIX: &str = "script-";

/// Pseudo-address for an output locked by a script without a standard address.
///
/// The address is `script-` followed by the first 32 hex characters of the SHA-256 of the
/// script's hex representation.
pub fn script_address(script_hex: &str) -> String {
	let digest = hex::encode(Sha256::digest(script_hex.as_bytes()));
	format!("{}{}", SCRIPT_PREFIX, &digest[..32])
}

/// Returns `true` for addresses that do not exist on chain.
pub fn is_sentinel(address: &str) -> bool {
	matches!(
		address,
		THE_VOID | THE_CONTRACT | STAKING_POOL | TREASURY | OPERATIONS | POOL
	) || address.starts_with(SCRIPT_PREFIX)
}
