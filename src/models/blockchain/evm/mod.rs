//! Ethereum Virtual Machine (EVM) node response shapes.

use alloy::primitives::{Address, B256, U256};
use num_bigint::{BigInt, Sign};

mod block;
mod receipt;
mod trace;
mod transaction;

pub use block::{EVMBlock, EVMTxPoolContent, EVMUncle, EVMWithdrawal};
pub use receipt::{EVMReceiptLog, EVMTransactionReceipt};
pub use trace::{EVMCallFrame, EVMParityAction, EVMParityResult, EVMParityTrace, EVMTraceResult};
pub use transaction::EVMTransaction;

/// Lower-case `0x`-prefixed form of an address
pub fn format_address(address: &Address) -> String {
	format!("0x{}", hex::encode(address.as_slice()))
}

/// `0x`-prefixed form of a 32-byte hash
pub fn format_hash(hash: &B256) -> String {
	format!("0x{}", hex::encode(hash.as_slice()))
}

pub fn u256_to_bigint(value: &U256) -> BigInt {
	BigInt::from_bytes_be(Sign::Plus, &value.to_be_bytes::<32>())
}
