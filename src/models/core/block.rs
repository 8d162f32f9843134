use serde::{Deserialize, Serialize};

use crate::models::{BlockId, Currency, Event};

/// Chain-specific data established while verifying a block's identity
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum BlockAux {
	#[default]
	None,
	/// Hashes of the block's transactions in block order
	TransactionHashes(Vec<String>),
	/// The blocks forming a Filecoin tipset
	Tipset {
		cids: Vec<String>,
		miners: Vec<String>,
		base_fee: String,
	},
	/// Block root per slot of an epoch, `None` for missed slots
	EpochSlots(Vec<Option<String>>),
	/// The slot or round produced no block
	Empty,
}

/// Transient state of one block-processing call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockContext {
	pub block_id: BlockId,
	pub block_hash: Option<String>,
	pub block_time: Option<String>,
	pub transaction_count: Option<usize>,
	pub aux: BlockAux,
}

impl BlockContext {
	pub fn new(block_id: BlockId) -> Self {
		Self {
			block_id,
			block_hash: None,
			block_time: None,
			transaction_count: None,
			aux: BlockAux::None,
		}
	}

	/// Context for unconfirmed transactions. No identity is verified.
	pub fn mempool() -> Self {
		Self::new(BlockId::Mempool)
	}

	/// Context for a height that holds no block
	pub fn empty(block_id: BlockId) -> Self {
		Self {
			aux: BlockAux::Empty,
			..Self::new(block_id)
		}
	}

	pub fn is_empty(&self) -> bool {
		matches!(self.aux, BlockAux::Empty)
	}

	/// Block time, or an empty string for the mempool.
	pub fn time(&self) -> &str {
		self.block_time.as_deref().unwrap_or_default()
	}
}

/// What a module hands to the sink for one block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockOutput {
	pub events: Vec<Event>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub currencies: Option<Vec<Currency>>,
}

impl BlockOutput {
	pub fn events(events: Vec<Event>) -> Self {
		Self {
			events,
			currencies: None,
		}
	}

	pub fn with_currencies(events: Vec<Event>, currencies: Vec<Currency>) -> Self {
		Self {
			events,
			currencies: Some(currencies),
		}
	}
}
