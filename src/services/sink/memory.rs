//! In-memory sink for tests and one-shot runs.

use async_trait::async_trait;
use std::{
	collections::{HashMap, HashSet},
	sync::{Mutex, MutexGuard},
};

use crate::{
	models::{BlockId, Currency, Event},
	services::{currency::KnownCurrencies, sink::Sink},
};

#[derive(Debug, Default)]
struct MemoryState {
	events: HashMap<String, Vec<(BlockId, Vec<Event>)>>,
	currencies: HashMap<String, Vec<Currency>>,
	known: HashMap<String, HashSet<String>>,
	last_blocks: HashMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct MemorySink {
	state: Mutex<MemoryState>,
}

impl MemorySink {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sink that already knows `ids` for `module`
	pub fn with_known_currencies(module: &str, ids: &[&str]) -> Self {
		let sink = Self::new();
		sink.lock().known.insert(
			module.to_string(),
			ids.iter().map(|id| id.to_string()).collect(),
		);
		sink
	}

	fn lock(&self) -> MutexGuard<'_, MemoryState> {
		self.state
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Every emission for `module`, in emission order
	pub fn emitted(&self, module: &str) -> Vec<(BlockId, Vec<Event>)> {
		self.lock().events.get(module).cloned().unwrap_or_default()
	}

	/// Events of the most recent emission for `module`
	pub fn last_events(&self, module: &str) -> Option<Vec<Event>> {
		self.lock()
			.events
			.get(module)
			.and_then(|emissions| emissions.last())
			.map(|(_, events)| events.clone())
	}

	pub fn currencies(&self, module: &str) -> Vec<Currency> {
		self.lock().currencies.get(module).cloned().unwrap_or_default()
	}

	/// How many times currencies were emitted for any module
	pub fn currency_emissions(&self) -> usize {
		self.lock().currencies.values().map(Vec::len).sum()
	}
}

impl KnownCurrencies for MemorySink {
	fn is_known(&self, module: &str, id: &str) -> bool {
		self.lock()
			.known
			.get(module)
			.is_some_and(|ids| ids.contains(id))
	}

	fn known_ids(&self, module: &str) -> Vec<String> {
		let mut ids: Vec<String> = self
			.lock()
			.known
			.get(module)
			.map(|ids| ids.iter().cloned().collect())
			.unwrap_or_default();
		ids.sort();
		ids
	}
}

#[async_trait]
impl Sink for MemorySink {
	async fn emit_events(
		&self,
		module: &str,
		block_id: BlockId,
		events: &[Event],
	) -> Result<(), anyhow::Error> {
		self.lock()
			.events
			.entry(module.to_string())
			.or_default()
			.push((block_id, events.to_vec()));
		Ok(())
	}

	async fn emit_currencies(
		&self,
		module: &str,
		currencies: &[Currency],
	) -> Result<(), anyhow::Error> {
		let mut state = self.lock();
		let known = state.known.entry(module.to_string()).or_default();
		let fresh: Vec<Currency> = currencies
			.iter()
			.filter(|currency| known.insert(currency.id.clone()))
			.cloned()
			.collect();
		state
			.currencies
			.entry(module.to_string())
			.or_default()
			.extend(fresh);
		Ok(())
	}

	async fn get_last_processed_block(&self, module: &str) -> Result<Option<u64>, anyhow::Error> {
		Ok(self.lock().last_blocks.get(module).copied())
	}

	async fn save_last_processed_block(&self, module: &str, block: u64) -> Result<(), anyhow::Error> {
		self.lock().last_blocks.insert(module.to_string(), block);
		Ok(())
	}
}
