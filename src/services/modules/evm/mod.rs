//! EVM execution-layer modules.
//!
//! - `evm-main`: native coin movements (fees, value transfers, rewards, withdrawals)
//! - `evm-erc-20`, `evm-erc-721`, `evm-erc-1155`: token transfers read from logs
//! - `evm-trace`: value moved by internal calls

mod abi;
mod native;
mod token;
mod trace;

pub use native::{EvmMainModule, EvmSpecialTransaction};
pub use token::{EvmTokenModule, TokenStandard};
pub use trace::{EvmTraceExtra, EvmTraceModule, TraceMethod};

use alloy::primitives::B256;
use serde_json::json;
use std::sync::Arc;

use crate::{
	models::{
		blockchain::evm::{format_hash, EVMBlock},
		BlockAux,
	},
	services::{
		blockchain::{requester, BlockIdentity, BlockchainTransport},
		indexer::IndexerError,
	},
	utils::{decimal, time},
};

/// Hex quantity of a block number
pub(crate) fn quantity(height: u64) -> String {
	format!("0x{:x}", height)
}

pub(crate) async fn latest_block<T: BlockchainTransport>(transport: &T) -> Result<u64, IndexerError> {
	let latest: String = requester::request_single(transport, "eth_blockNumber", json!([])).await?;
	Ok(decimal::parse_hex_u64(&latest)?)
}

/// Identity of block `height` as seen by one node, with its transaction hashes
pub(crate) async fn fetch_identity<T: BlockchainTransport>(
	node: Arc<T>,
	height: u64,
) -> Result<BlockIdentity, IndexerError> {
	let block: Option<EVMBlock<B256>> = requester::request_single(
		node.as_ref(),
		"eth_getBlockByNumber",
		json!([quantity(height), false]),
	)
	.await?;
	let block = block.ok_or_else(|| not_yet_available(height))?;

	let hashes: Vec<String> = block.transactions.iter().map(format_hash).collect();
	Ok(
		BlockIdentity::new(
			format_hash(&block.hash),
			time::from_unix_seconds(block.timestamp() as i64),
		)
		.with_transaction_count(hashes.len())
		.with_aux(BlockAux::TransactionHashes(hashes)),
	)
}

/// The node has not seen the block yet
pub(crate) fn not_yet_available(height: u64) -> IndexerError {
	IndexerError::requester_error(
		"Block is not available on the node yet",
		None,
		Some(std::collections::HashMap::from([(
			"block".to_string(),
			height.to_string(),
		)])),
	)
}
