//! Block watcher service implementation.
//!
//! One watcher runs per (network, module) pair. On every cron tick it reads the module's
//! progress from the sink, works out which confirmed blocks are still missing and
//! processes them one at a time in ascending order.

use anyhow::Context;
use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::instrument;

use crate::{
	models::{BlockId, Network},
	services::{
		blockwatcher::error::BlockWatcherError,
		indexer::{processor, IndexerError, IndexerModule},
		sink::Sink,
	},
};

/// Trait for job scheduler
///
/// This trait is used to abstract the job scheduler implementation.
/// It is used to allow the block watcher service to be used with different job scheduler
/// implementations.
#[async_trait::async_trait]
pub trait JobSchedulerTrait: Send + Sync + Sized {
	async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>>;
	async fn add(&self, job: Job) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
	async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
	async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[async_trait::async_trait]
impl JobSchedulerTrait for JobScheduler {
	async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
		Self::new().await.map_err(Into::into)
	}

	async fn add(&self, job: Job) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		self.add(job).await.map(|_| ()).map_err(Into::into)
	}

	async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		self.start().await.map(|_| ()).map_err(Into::into)
	}

	async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		self.shutdown().await.map(|_| ()).map_err(Into::into)
	}
}

/// Outcome of one successful watcher tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherRun {
	/// Blocks processed during the tick
	pub processed: u64,
	/// Progress recorded in the sink after the tick
	pub last_processed_block: Option<u64>,
}

/// Watcher of a single module on a single network
pub struct ModuleBlockWatcher<S, J>
where
	J: JobSchedulerTrait,
{
	pub network: Network,
	pub module: Arc<dyn IndexerModule>,
	pub sink: Arc<S>,
	pub scheduler: J,
	halted: Arc<AtomicBool>,
}

type BlockWatchersMap<S, J> = HashMap<String, ModuleBlockWatcher<S, J>>;

/// Service for managing the watchers of every configured module
pub struct BlockWatcherService<S, J>
where
	J: JobSchedulerTrait,
{
	pub sink: Arc<S>,
	pub active_watchers: Arc<RwLock<BlockWatchersMap<S, J>>>,
}

fn watcher_metadata(network: &Network, module: &dyn IndexerModule) -> HashMap<String, String> {
	HashMap::from([
		("network".to_string(), network.slug.clone()),
		("module".to_string(), module.descriptor().name.clone()),
	])
}

impl<S, J> ModuleBlockWatcher<S, J>
where
	S: Sink + 'static,
	J: JobSchedulerTrait,
{
	pub async fn new(
		network: Network,
		module: Arc<dyn IndexerModule>,
		sink: Arc<S>,
	) -> Result<Self, BlockWatcherError> {
		let scheduler = J::new().await.map_err(|e| {
			BlockWatcherError::scheduler_error(
				e.to_string(),
				Some(e),
				Some(watcher_metadata(&network, module.as_ref())),
			)
		})?;
		Ok(Self {
			network,
			module,
			sink,
			scheduler,
			halted: Arc::new(AtomicBool::new(false)),
		})
	}

	/// Whether a processing failure stopped this watcher
	pub fn is_halted(&self) -> bool {
		self.halted.load(Ordering::SeqCst)
	}

	/// Schedules the watcher on the network's cron expression
	///
	/// A tick that starts while the previous one is still running is skipped.
	pub async fn start(&mut self) -> Result<(), BlockWatcherError> {
		let network = self.network.clone();
		let module = self.module.clone();
		let sink = self.sink.clone();
		let halted = self.halted.clone();
		let running = Arc::new(Mutex::new(()));

		let job = Job::new_async(self.network.cron_schedule.as_str(), move |_uuid, _l| {
			let network = network.clone();
			let module = module.clone();
			let sink = sink.clone();
			let halted = halted.clone();
			let running = running.clone();
			Box::pin(async move {
				if halted.load(Ordering::SeqCst) {
					return;
				}
				let Ok(_guard) = running.try_lock() else {
					tracing::debug!(
						network = %network.slug,
						module = %module.descriptor().name,
						"Previous tick still running"
					);
					return;
				};
				if let Err(e) = process_new_blocks(&network, module.as_ref(), sink.as_ref()).await {
					if e.halts_watcher() {
						halted.store(true, Ordering::SeqCst);
						tracing::error!(
							network = %network.slug,
							module = %module.descriptor().name,
							error = %e,
							"Block watcher halted"
						);
					}
				}
			})
		})
		.with_context(|| "Failed to create job")?;

		self.scheduler.add(job).await.map_err(|e| {
			BlockWatcherError::scheduler_error(
				e.to_string(),
				Some(e),
				Some(watcher_metadata(&self.network, self.module.as_ref())),
			)
		})?;

		self.scheduler.start().await.map_err(|e| {
			BlockWatcherError::scheduler_error(
				e.to_string(),
				Some(e),
				Some(watcher_metadata(&self.network, self.module.as_ref())),
			)
		})?;

		tracing::info!(
			network = %self.network.slug,
			module = %self.module.descriptor().name,
			"Started block watcher"
		);
		Ok(())
	}

	pub async fn stop(&mut self) -> Result<(), BlockWatcherError> {
		self.scheduler.shutdown().await.map_err(|e| {
			BlockWatcherError::scheduler_error(
				e.to_string(),
				Some(e),
				Some(watcher_metadata(&self.network, self.module.as_ref())),
			)
		})?;

		tracing::info!(
			network = %self.network.slug,
			module = %self.module.descriptor().name,
			"Stopped block watcher"
		);
		Ok(())
	}
}

impl<S, J> BlockWatcherService<S, J>
where
	S: Sink + 'static,
	J: JobSchedulerTrait,
{
	pub fn new(sink: Arc<S>) -> Self {
		BlockWatcherService {
			sink,
			active_watchers: Arc::new(RwLock::new(HashMap::new())),
		}
	}

	/// Starts a watcher for `module`, keyed by the module name
	pub async fn start_module_watcher(
		&self,
		network: &Network,
		module: Arc<dyn IndexerModule>,
	) -> Result<(), BlockWatcherError> {
		let mut watchers = self.active_watchers.write().await;
		let name = module.descriptor().name.clone();

		if watchers.contains_key(&name) {
			tracing::info!(module = %name, "Block watcher already running");
			return Ok(());
		}

		let mut watcher = ModuleBlockWatcher::new(network.clone(), module, self.sink.clone()).await?;
		watcher.start().await?;
		watchers.insert(name, watcher);

		Ok(())
	}

	pub async fn stop_module_watcher(&self, module: &str) -> Result<(), BlockWatcherError> {
		let mut watchers = self.active_watchers.write().await;

		if let Some(mut watcher) = watchers.remove(module) {
			watcher.stop().await?;
		}

		Ok(())
	}

	/// Names of the watchers a processing failure stopped
	pub async fn halted_watchers(&self) -> Vec<String> {
		let mut names: Vec<String> = self
			.active_watchers
			.read()
			.await
			.iter()
			.filter(|(_, watcher)| watcher.is_halted())
			.map(|(name, _)| name.clone())
			.collect();
		names.sort();
		names
	}
}

/// Maps a module failure onto what the watcher does next
fn classify(error: IndexerError, metadata: HashMap<String, String>) -> BlockWatcherError {
	match error {
		IndexerError::RequesterError(_) => {
			BlockWatcherError::network_error("Nodes failed to answer", Some(Box::new(error)), Some(metadata))
		}
		// Sink failures reach the processor as untyped errors
		IndexerError::Other(_) => {
			BlockWatcherError::storage_error("Failed to emit block", Some(Box::new(error)), Some(metadata))
		}
		_ => BlockWatcherError::processing_error(
			"Block failed validation",
			Some(Box::new(error)),
			Some(metadata),
		),
	}
}

/// Processes the confirmed blocks `module` has not seen yet
///
/// Progress is saved after every block, so a failure leaves the sink pointing at the last
/// block that went through completely.
#[instrument(skip_all, fields(network = %network.slug, module = %module.descriptor().name))]
pub async fn process_new_blocks<S: Sink>(
	network: &Network,
	module: &dyn IndexerModule,
	sink: &S,
) -> Result<WatcherRun, BlockWatcherError> {
	let start_time = std::time::Instant::now();
	let name = module.descriptor().name.as_str();
	let metadata = watcher_metadata(network, module);

	let last_processed_block = sink
		.get_last_processed_block(name)
		.await
		.map_err(|e| {
			BlockWatcherError::storage_error(
				"Failed to get last processed block",
				Some(e.into()),
				Some(metadata.clone()),
			)
		})?;

	let latest_block = module
		.inquire_latest_block()
		.await
		.map_err(|e| classify(e, metadata.clone()))?;
	let latest_confirmed_block = latest_block.saturating_sub(network.confirmation_blocks);

	let max_past_blocks = network
		.max_past_blocks
		.unwrap_or_else(|| network.get_recommended_past_blocks());

	// A module without progress starts at the latest confirmed block
	let start_block = match last_processed_block {
		Some(last) => std::cmp::max(
			last + 1,
			(latest_confirmed_block + 1).saturating_sub(max_past_blocks),
		),
		None => latest_confirmed_block,
	};

	tracing::info!(
		last_processed_block = ?last_processed_block,
		latest_confirmed_block,
		start_block,
		skipped = last_processed_block.map_or(0, |last| start_block.saturating_sub(last + 1)),
		confirmations = network.confirmation_blocks,
		max_past_blocks,
		"Processing blocks"
	);

	let mut run = WatcherRun {
		processed: 0,
		last_processed_block,
	};
	for height in start_block..=latest_confirmed_block {
		if let Err(e) = processor::process_block(module, sink, BlockId::Height(height)).await {
			let mut metadata = metadata.clone();
			metadata.insert("block".to_string(), height.to_string());
			let error = classify(e, metadata);
			tracing::warn!(
				block = height,
				processed = run.processed,
				retry = !error.halts_watcher(),
				"Stopping run at failed block"
			);
			return Err(error);
		}

		sink.save_last_processed_block(name, height)
			.await
			.map_err(|e| {
				BlockWatcherError::storage_error(
					"Failed to save last processed block",
					Some(e.into()),
					Some(metadata.clone()),
				)
			})?;
		run.processed += 1;
		run.last_processed_block = Some(height);
	}

	tracing::info!(
		processed = run.processed,
		elapsed_ms = start_time.elapsed().as_millis() as u64,
		"Processed blocks"
	);
	Ok(run)
}
