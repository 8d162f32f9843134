//! Module contract, module factory and block processor.
//!
//! Every chain module turns one block into a list of balance-changing events in four steps:
//! fetch the raw block from the nodes, extract movements, reconcile them (fees, mint/burn
//! against `the-void`), and order them. The processor wraps a module call with the output
//! checks that hold for every module and hands the result to a sink.

mod error;
mod factory;
pub mod processor;

pub use error::IndexerError;
pub use factory::{create_module, create_modules};

use async_trait::async_trait;
use std::collections::HashMap;

use crate::{
	models::{BlockContext, BlockId, BlockOutput, ModuleDescriptor},
	services::currency::KnownCurrencies,
};

/// A normalization module bound to one network
#[async_trait]
pub trait IndexerModule: Send + Sync {
	/// Static capabilities of the module
	fn descriptor(&self) -> &ModuleDescriptor;

	/// Height of the most recent block the nodes know about
	async fn inquire_latest_block(&self) -> Result<u64, IndexerError>;

	/// Verifies the identity of `block_id` across the consensus nodes
	///
	/// For [`BlockId::Mempool`] no node is queried.
	async fn ensure_block(&self, block_id: BlockId) -> Result<BlockContext, IndexerError>;

	/// Fetches and normalizes the block described by `context`
	///
	/// `known` is consulted before fetching currency metadata; it is never written to.
	async fn process_block(
		&self,
		context: &BlockContext,
		known: &dyn KnownCurrencies,
	) -> Result<BlockOutput, IndexerError>;

	/// Current balances of `address`, one amount per entry of `currencies`
	///
	/// With no currencies the module's native balance is returned as the only entry.
	async fn api_get_balance(
		&self,
		address: &str,
		currencies: &[String],
	) -> Result<Vec<String>, IndexerError> {
		let _ = (address, currencies);
		Err(IndexerError::developer_error(
			"Balance queries are not supported by this module",
			None,
			Some(module_metadata(self.descriptor())),
		))
	}
}

/// Context for the mempool, or an error for modules that cannot read it
pub fn mempool_context(descriptor: &ModuleDescriptor) -> Result<BlockContext, IndexerError> {
	if descriptor.mempool_support {
		Ok(BlockContext::mempool())
	} else {
		Err(IndexerError::developer_error(
			"Mempool is not supported by this module",
			None,
			Some(module_metadata(descriptor)),
		))
	}
}

/// Height of a confirmed block, or an error for the mempool
pub fn confirmed_height(
	descriptor: &ModuleDescriptor,
	block_id: BlockId,
) -> Result<u64, IndexerError> {
	block_id.height().ok_or_else(|| {
		IndexerError::developer_error(
			"Mempool is not supported by this module",
			None,
			Some(module_metadata(descriptor)),
		)
	})
}

pub(crate) fn module_metadata(descriptor: &ModuleDescriptor) -> HashMap<String, String> {
	HashMap::from([
		("module".to_string(), descriptor.name.clone()),
		("kind".to_string(), descriptor.kind.to_string()),
	])
}
