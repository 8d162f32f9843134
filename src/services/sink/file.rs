//! File-based sink.
//!
//! Layout under the storage directory:
//! - `{module}_events_{block}.json`: events of one block
//! - `{module}_currencies.json`: every currency recorded for the module
//! - `{module}_last_block.txt`: last successfully processed block

use async_trait::async_trait;
use glob::glob;
use std::{
	collections::{HashMap, HashSet},
	path::PathBuf,
	sync::RwLock,
};

use crate::{
	models::{BlockId, Currency, Event},
	services::{
		currency::KnownCurrencies,
		sink::{block_label, Sink},
	},
};

const CURRENCIES_SUFFIX: &str = "_currencies.json";

pub struct FileSink {
	storage_path: PathBuf,
	/// Currency ids per module, mirrored from the currency files
	known: RwLock<HashMap<String, HashSet<String>>>,
}

impl FileSink {
	/// Creates a sink over `storage_path` without reading existing currency files
	pub fn new(storage_path: PathBuf) -> Self {
		Self {
			storage_path,
			known: RwLock::new(HashMap::new()),
		}
	}

	/// Creates a sink and loads the currencies recorded by earlier runs
	pub async fn open(storage_path: PathBuf) -> Result<Self, anyhow::Error> {
		tokio::fs::create_dir_all(&storage_path)
			.await
			.map_err(|e| anyhow::anyhow!("Failed to create storage directory: {}", e))?;

		let sink = Self::new(storage_path);
		let pattern = sink
			.storage_path
			.join(format!("*{}", CURRENCIES_SUFFIX))
			.to_string_lossy()
			.to_string();

		for entry in glob(&pattern)
			.map_err(|e| anyhow::anyhow!("Failed to parse currency file pattern: {}", e))?
			.flatten()
		{
			let Some(module) = entry
				.file_name()
				.and_then(|name| name.to_str())
				.and_then(|name| name.strip_suffix(CURRENCIES_SUFFIX))
				.map(str::to_string)
			else {
				continue;
			};
			let currencies = sink.read_currencies(&module).await?;
			sink.remember(&module, &currencies);
		}
		Ok(sink)
	}

	fn events_path(&self, module: &str, block_id: BlockId) -> PathBuf {
		self.storage_path
			.join(format!("{}_events_{}.json", module, block_label(block_id)))
	}

	fn currencies_path(&self, module: &str) -> PathBuf {
		self.storage_path
			.join(format!("{}{}", module, CURRENCIES_SUFFIX))
	}

	async fn read_currencies(&self, module: &str) -> Result<Vec<Currency>, anyhow::Error> {
		let path = self.currencies_path(module);
		if !path.exists() {
			return Ok(Vec::new());
		}
		let content = tokio::fs::read_to_string(&path)
			.await
			.map_err(|e| anyhow::anyhow!("Failed to read currencies: {}", e))?;
		serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Failed to parse currencies: {}", e))
	}

	fn remember(&self, module: &str, currencies: &[Currency]) {
		let mut known = self
			.known
			.write()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		let ids = known.entry(module.to_string()).or_default();
		ids.extend(currencies.iter().map(|currency| currency.id.clone()));
	}

	/// Deletes every events file of a module
	pub async fn delete_events(&self, module: &str) -> Result<(), anyhow::Error> {
		let pattern = self
			.storage_path
			.join(format!("{}_events_*.json", module))
			.to_string_lossy()
			.to_string();

		for entry in glob(&pattern)
			.map_err(|e| anyhow::anyhow!("Failed to parse events file pattern: {}", e))?
			.flatten()
		{
			tokio::fs::remove_file(entry)
				.await
				.map_err(|e| anyhow::anyhow!("Failed to delete events: {}", e))?;
		}
		Ok(())
	}
}

impl Default for FileSink {
	fn default() -> Self {
		FileSink::new(PathBuf::from("data"))
	}
}

impl KnownCurrencies for FileSink {
	fn is_known(&self, module: &str, id: &str) -> bool {
		self.known
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.get(module)
			.is_some_and(|ids| ids.contains(id))
	}

	fn known_ids(&self, module: &str) -> Vec<String> {
		let mut ids: Vec<String> = self
			.known
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.get(module)
			.map(|ids| ids.iter().cloned().collect())
			.unwrap_or_default();
		ids.sort();
		ids
	}
}

#[async_trait]
impl Sink for FileSink {
	async fn emit_events(
		&self,
		module: &str,
		block_id: BlockId,
		events: &[Event],
	) -> Result<(), anyhow::Error> {
		let json = serde_json::to_string(events)
			.map_err(|e| anyhow::anyhow!("Failed to serialize events: {}", e))?;
		tokio::fs::write(self.events_path(module, block_id), json)
			.await
			.map_err(|e| anyhow::anyhow!("Failed to save events: {}", e))?;
		Ok(())
	}

	/// Merges `currencies` into the module's currency file; ids already present are kept as-is
	async fn emit_currencies(
		&self,
		module: &str,
		currencies: &[Currency],
	) -> Result<(), anyhow::Error> {
		let mut recorded = self.read_currencies(module).await?;
		let mut ids: HashSet<String> = recorded.iter().map(|c| c.id.clone()).collect();
		for currency in currencies {
			if ids.insert(currency.id.clone()) {
				recorded.push(currency.clone());
			}
		}

		let json = serde_json::to_string_pretty(&recorded)
			.map_err(|e| anyhow::anyhow!("Failed to serialize currencies: {}", e))?;
		tokio::fs::write(self.currencies_path(module), json)
			.await
			.map_err(|e| anyhow::anyhow!("Failed to save currencies: {}", e))?;

		self.remember(module, currencies);
		Ok(())
	}

	async fn get_last_processed_block(&self, module: &str) -> Result<Option<u64>, anyhow::Error> {
		let file_path = self
			.storage_path
			.join(format!("{}_last_block.txt", module));

		if !file_path.exists() {
			return Ok(None);
		}

		let content = tokio::fs::read_to_string(file_path)
			.await
			.map_err(|e| anyhow::anyhow!("Failed to read last processed block: {}", e))?;
		let block_number = content
			.trim()
			.parse::<u64>()
			.map_err(|e| anyhow::anyhow!("Failed to parse last processed block: {}", e))?;
		Ok(Some(block_number))
	}

	async fn save_last_processed_block(&self, module: &str, block: u64) -> Result<(), anyhow::Error> {
		let file_path = self
			.storage_path
			.join(format!("{}_last_block.txt", module));
		tokio::fs::write(file_path, block.to_string())
			.await
			.map_err(|e| anyhow::anyhow!("Failed to save last processed block: {}", e))?;
		Ok(())
	}
}
