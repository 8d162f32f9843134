use async_trait::async_trait;
use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Mutex,
	},
};

use multichain_indexer::{
	models::{
		BlockContext, BlockId, BlockOutput, Currency, CurrencyFormat, Effect, Event,
		ModuleDescriptor, ModuleKind,
	},
	services::{
		currency::KnownCurrencies,
		indexer::{IndexerError, IndexerModule},
	},
};

/// How a scripted block goes wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
	/// Nodes do not answer
	Unreachable,
	/// Nodes disagree on the block hash
	Disagreement,
	/// The module reports malformed node data
	Malformed,
	/// The module returns events that do not sum to zero
	Unbalanced,
}

/// Module producing one balanced transfer per block unless told otherwise
///
/// Every height passed to `process_block` is recorded, so tests can check which blocks
/// were visited and in which order.
pub struct ScriptedModule {
	descriptor: ModuleDescriptor,
	latest: AtomicU64,
	failures: Mutex<HashMap<u64, ScriptedFailure>>,
	processed: Mutex<Vec<BlockId>>,
	token: Option<Currency>,
}

impl ScriptedModule {
	pub fn new(name: &str, latest: u64) -> Self {
		Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::EvmMain)
				.with_extra_vocabulary(vec!["f"])
				.with_mempool_support(),
			latest: AtomicU64::new(latest),
			failures: Mutex::new(HashMap::new()),
			processed: Mutex::new(Vec::new()),
			token: None,
		}
	}

	/// Turns the module into a token module whose transfers move `currency`
	pub fn with_token(mut self, currency: Currency) -> Self {
		self.descriptor = ModuleDescriptor::new(self.descriptor.name.clone(), ModuleKind::EvmErc20)
			.with_currency_format(CurrencyFormat::EvmAddress);
		self.token = Some(currency);
		self
	}

	pub fn fail_at(self, height: u64, failure: ScriptedFailure) -> Self {
		self.failures.lock().unwrap().insert(height, failure);
		self
	}

	pub fn heal(&self, height: u64) {
		self.failures.lock().unwrap().remove(&height);
	}

	pub fn set_latest(&self, latest: u64) {
		self.latest.store(latest, Ordering::SeqCst);
	}

	pub fn processed(&self) -> Vec<BlockId> {
		self.processed.lock().unwrap().clone()
	}

	fn failure(&self, block_id: BlockId) -> Option<ScriptedFailure> {
		let height = block_id.height()?;
		self.failures.lock().unwrap().get(&height).copied()
	}

	fn transfer(&self, block_id: BlockId, address: &str, amount: i64) -> Event {
		let mut event = Event::new(
			block_id,
			"2024-01-01 00:00:00",
			Some(format!("0xtx{}", block_id)),
			address,
			Effect::amount(amount),
		);
		if let Some(token) = &self.token {
			event.currency = Some(token.id.clone());
		}
		event
	}
}

#[async_trait]
impl IndexerModule for ScriptedModule {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		Ok(self.latest.load(Ordering::SeqCst))
	}

	async fn ensure_block(&self, block_id: BlockId) -> Result<BlockContext, IndexerError> {
		match self.failure(block_id) {
			Some(ScriptedFailure::Unreachable) => Err(IndexerError::requester_error(
				"connection refused",
				None,
				None,
			)),
			Some(ScriptedFailure::Disagreement) => Err(IndexerError::consensus_error(
				"Nodes disagree on block identity",
				None,
				Some(HashMap::from([
					("hash_a".to_string(), "0xaa".to_string()),
					("hash_b".to_string(), "0xbb".to_string()),
				])),
			)),
			_ => Ok(BlockContext {
				block_hash: Some(format!("0xhash{}", block_id)),
				block_time: Some("2024-01-01 00:00:00".to_string()),
				..BlockContext::new(block_id)
			}),
		}
	}

	async fn process_block(
		&self,
		context: &BlockContext,
		known: &dyn KnownCurrencies,
	) -> Result<BlockOutput, IndexerError> {
		let block_id = context.block_id;
		self.processed.lock().unwrap().push(block_id);

		if self.failure(block_id) == Some(ScriptedFailure::Malformed) {
			return Err(IndexerError::malformed(
				"Block is missing its transactions",
				"block",
				block_id,
			));
		}

		let mut events = vec![
			self.transfer(block_id, "alice", -10),
			self.transfer(block_id, "bob", 10),
		];
		if self.failure(block_id) == Some(ScriptedFailure::Unbalanced) {
			events.pop();
		}
		for (index, event) in events.iter_mut().enumerate() {
			event.sort_key = index as u64;
		}

		match &self.token {
			Some(token) if !known.is_known(&self.descriptor.name, &token.id) => Ok(
				BlockOutput::with_currencies(events, vec![token.clone()]),
			),
			_ => Ok(BlockOutput::events(events)),
		}
	}

	async fn api_get_balance(
		&self,
		address: &str,
		currencies: &[String],
	) -> Result<Vec<String>, IndexerError> {
		let _ = address;
		if currencies.is_empty() {
			return Ok(vec!["100".to_string()]);
		}
		Ok(currencies.iter().map(|_| "0".to_string()).collect())
	}
}
