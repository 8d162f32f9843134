//! Sink adapters.
//!
//! A sink receives the normalized output of every processed block and remembers how far
//! each module has progressed. Events of a block are emitted exactly once, currencies at
//! most once, and only after the whole block validated.

mod file;
mod memory;

pub use file::FileSink;
pub use memory::MemorySink;

use async_trait::async_trait;

use crate::{
	models::{BlockId, Currency, Event},
	services::currency::KnownCurrencies,
};

#[async_trait]
pub trait Sink: KnownCurrencies {
	/// Stores the events of one block; the array order is the final ledger order
	async fn emit_events(
		&self,
		module: &str,
		block_id: BlockId,
		events: &[Event],
	) -> Result<(), anyhow::Error>;

	/// Records newly discovered currencies
	async fn emit_currencies(&self, module: &str, currencies: &[Currency])
		-> Result<(), anyhow::Error>;

	async fn get_last_processed_block(&self, module: &str) -> Result<Option<u64>, anyhow::Error>;

	async fn save_last_processed_block(&self, module: &str, block: u64)
		-> Result<(), anyhow::Error>;
}

/// File name fragment of a block id
pub(crate) fn block_label(block_id: BlockId) -> String {
	match block_id {
		BlockId::Height(height) => height.to_string(),
		BlockId::Mempool => "mempool".to_string(),
	}
}
