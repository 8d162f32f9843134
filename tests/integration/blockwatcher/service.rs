use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio_cron_scheduler::JobScheduler;

use multichain_indexer::{
	models::{BlockId, Currency, Event},
	services::{
		blockwatcher::{
			process_new_blocks, BlockWatcherError, BlockWatcherService, ModuleBlockWatcher,
			WatcherRun,
		},
		currency::KnownCurrencies,
		sink::{MemorySink, Sink},
	},
	utils::tests::NetworkBuilder,
};

use crate::integration::mocks::{MockJobScheduler, ScriptedFailure, ScriptedModule};

const MODULE: &str = "eth-evm-main";

fn heights(range: std::ops::RangeInclusive<u64>) -> Vec<BlockId> {
	range.map(BlockId::Height).collect()
}

/// Memory sink whose progress writes fail
#[derive(Default)]
struct ReadOnlySink {
	inner: MemorySink,
}

impl KnownCurrencies for ReadOnlySink {
	fn is_known(&self, module: &str, id: &str) -> bool {
		self.inner.is_known(module, id)
	}

	fn known_ids(&self, module: &str) -> Vec<String> {
		self.inner.known_ids(module)
	}
}

#[async_trait]
impl Sink for ReadOnlySink {
	async fn emit_events(
		&self,
		module: &str,
		block_id: BlockId,
		events: &[Event],
	) -> Result<(), anyhow::Error> {
		self.inner.emit_events(module, block_id, events).await
	}

	async fn emit_currencies(
		&self,
		module: &str,
		currencies: &[Currency],
	) -> Result<(), anyhow::Error> {
		self.inner.emit_currencies(module, currencies).await
	}

	async fn get_last_processed_block(&self, module: &str) -> Result<Option<u64>, anyhow::Error> {
		self.inner.get_last_processed_block(module).await
	}

	async fn save_last_processed_block(&self, _module: &str, _block: u64) -> Result<(), anyhow::Error> {
		Err(anyhow::anyhow!("read-only file system"))
	}
}

#[tokio::test]
async fn test_first_run_starts_at_latest_confirmed_block() {
	let network = NetworkBuilder::new().confirmation_blocks(1).build();
	let module = ScriptedModule::new(MODULE, 100);
	let sink = MemorySink::new();

	let run = process_new_blocks(&network, &module, &sink).await.unwrap();

	assert_eq!(
		run,
		WatcherRun {
			processed: 1,
			last_processed_block: Some(99),
		}
	);
	assert_eq!(module.processed(), vec![BlockId::Height(99)]);
	assert_eq!(sink.get_last_processed_block(MODULE).await.unwrap(), Some(99));
}

#[tokio::test]
async fn test_catches_up_from_saved_progress() {
	let network = NetworkBuilder::new()
		.confirmation_blocks(3)
		.max_past_blocks(50)
		.build();
	let module = ScriptedModule::new(MODULE, 100);
	let sink = MemorySink::new();
	sink.save_last_processed_block(MODULE, 90).await.unwrap();

	let run = process_new_blocks(&network, &module, &sink).await.unwrap();

	assert_eq!(run.processed, 7);
	assert_eq!(module.processed(), heights(91..=97));
	let emitted: Vec<BlockId> = sink
		.emitted(MODULE)
		.into_iter()
		.map(|(block_id, _)| block_id)
		.collect();
	assert_eq!(emitted, heights(91..=97));
	assert_eq!(sink.get_last_processed_block(MODULE).await.unwrap(), Some(97));
}

#[tokio::test]
async fn test_backlog_is_capped_by_max_past_blocks() {
	let network = NetworkBuilder::new()
		.confirmation_blocks(1)
		.max_past_blocks(3)
		.build();
	let module = ScriptedModule::new(MODULE, 100);
	let sink = MemorySink::new();
	sink.save_last_processed_block(MODULE, 50).await.unwrap();

	process_new_blocks(&network, &module, &sink).await.unwrap();

	assert_eq!(module.processed(), heights(97..=99));
}

#[tokio::test]
async fn test_up_to_date_module_processes_nothing() {
	let network = NetworkBuilder::new().confirmation_blocks(1).build();
	let module = ScriptedModule::new(MODULE, 100);
	let sink = MemorySink::new();
	sink.save_last_processed_block(MODULE, 99).await.unwrap();

	let run = process_new_blocks(&network, &module, &sink).await.unwrap();

	assert_eq!(run.processed, 0);
	assert_eq!(run.last_processed_block, Some(99));
	assert!(module.processed().is_empty());
}

#[tokio::test]
async fn test_unreachable_nodes_are_retried_next_tick() {
	let network = NetworkBuilder::new().confirmation_blocks(1).build();
	let module = ScriptedModule::new(MODULE, 100).fail_at(97, ScriptedFailure::Unreachable);
	let sink = MemorySink::new();
	sink.save_last_processed_block(MODULE, 95).await.unwrap();

	let error = process_new_blocks(&network, &module, &sink).await.unwrap_err();

	assert!(matches!(error, BlockWatcherError::NetworkError(_)));
	assert!(!error.halts_watcher());
	// Block 96 went through before the failure
	assert_eq!(sink.get_last_processed_block(MODULE).await.unwrap(), Some(96));

	module.heal(97);
	let run = process_new_blocks(&network, &module, &sink).await.unwrap();

	assert_eq!(run.processed, 3);
	assert_eq!(sink.get_last_processed_block(MODULE).await.unwrap(), Some(99));
	let emitted: Vec<BlockId> = sink
		.emitted(MODULE)
		.into_iter()
		.map(|(block_id, _)| block_id)
		.collect();
	assert_eq!(emitted, heights(96..=99));
}

#[tokio::test]
async fn test_invalid_blocks_halt_the_watcher() {
	let network = NetworkBuilder::new().confirmation_blocks(1).build();
	let sink = MemorySink::new();
	sink.save_last_processed_block(MODULE, 97).await.unwrap();

	for failure in [
		ScriptedFailure::Disagreement,
		ScriptedFailure::Malformed,
		ScriptedFailure::Unbalanced,
	] {
		let module = ScriptedModule::new(MODULE, 100).fail_at(98, failure);

		let error = process_new_blocks(&network, &module, &sink).await.unwrap_err();

		assert!(
			matches!(error, BlockWatcherError::ProcessingError(_)),
			"{:?} should halt",
			failure
		);
		assert!(error.halts_watcher());
		assert!(error.to_string().contains("Block failed validation"));
		assert_eq!(sink.get_last_processed_block(MODULE).await.unwrap(), Some(97));
	}
	assert!(sink.emitted(MODULE).is_empty());
}

#[tokio::test]
async fn test_progress_write_failure_is_a_storage_error() {
	let network = NetworkBuilder::new().confirmation_blocks(1).build();
	let module = ScriptedModule::new(MODULE, 100);
	let sink = ReadOnlySink::default();

	let error = process_new_blocks(&network, &module, &sink).await.unwrap_err();

	assert!(matches!(error, BlockWatcherError::StorageError(_)));
	assert!(!error.halts_watcher());
}

#[tokio::test]
async fn test_watcher_processes_blocks_on_schedule() {
	let network = NetworkBuilder::new()
		.confirmation_blocks(1)
		.cron_schedule("*/1 * * * * *")
		.build();
	let module = Arc::new(ScriptedModule::new(MODULE, 10));
	let sink = Arc::new(MemorySink::new());

	let mut watcher = ModuleBlockWatcher::<_, JobScheduler>::new(
		network,
		module.clone(),
		sink.clone(),
	)
	.await
	.unwrap();
	watcher.start().await.unwrap();

	let mut waited = Duration::ZERO;
	while module.processed().is_empty() && waited < Duration::from_secs(5) {
		tokio::time::sleep(Duration::from_millis(100)).await;
		waited += Duration::from_millis(100);
	}

	module.set_latest(12);
	let mut waited = Duration::ZERO;
	while sink.get_last_processed_block(MODULE).await.unwrap() != Some(11)
		&& waited < Duration::from_secs(5)
	{
		tokio::time::sleep(Duration::from_millis(100)).await;
		waited += Duration::from_millis(100);
	}
	watcher.stop().await.unwrap();

	assert_eq!(module.processed(), heights(9..=11));
	assert!(!watcher.is_halted());
}

#[tokio::test]
async fn test_halted_watchers_are_reported() {
	let network = NetworkBuilder::new()
		.confirmation_blocks(1)
		.cron_schedule("*/1 * * * * *")
		.build();
	let healthy = Arc::new(ScriptedModule::new("eth-evm-main", 10));
	let broken = Arc::new(
		ScriptedModule::new("eth-evm-erc-20", 10).fail_at(9, ScriptedFailure::Disagreement),
	);

	let service =
		BlockWatcherService::<_, JobScheduler>::new(Arc::new(MemorySink::new()));
	service
		.start_module_watcher(&network, healthy.clone())
		.await
		.unwrap();
	service
		.start_module_watcher(&network, broken.clone())
		.await
		.unwrap();
	assert_eq!(service.active_watchers.read().await.len(), 2);

	let mut waited = Duration::ZERO;
	while service.halted_watchers().await.is_empty() && waited < Duration::from_secs(5) {
		tokio::time::sleep(Duration::from_millis(100)).await;
		waited += Duration::from_millis(100);
	}

	assert_eq!(service.halted_watchers().await, vec!["eth-evm-erc-20"]);
	// A halted watcher stays registered but no longer ticks
	tokio::time::sleep(Duration::from_millis(1500)).await;
	assert!(broken.processed().is_empty());
	assert_eq!(healthy.processed(), vec![BlockId::Height(9)]);

	service.stop_module_watcher("eth-evm-main").await.unwrap();
	service.stop_module_watcher("eth-evm-erc-20").await.unwrap();
	assert!(service.active_watchers.read().await.is_empty());
}

#[tokio::test]
async fn test_scheduler_failures() {
	let network = NetworkBuilder::new().build();
	let sink = Arc::new(MemorySink::new());

	// Test case 1: Scheduler fails to initialize
	{
		let ctx = MockJobScheduler::new_context();
		ctx.expect()
			.returning(|| Err("Failed to initialize scheduler".into()));

		let service = BlockWatcherService::<_, MockJobScheduler>::new(sink.clone());
		let result = service
			.start_module_watcher(&network, Arc::new(ScriptedModule::new(MODULE, 10)))
			.await;

		assert!(matches!(
			result.unwrap_err(),
			BlockWatcherError::SchedulerError(_)
		));
		assert!(service.active_watchers.read().await.is_empty());
	}

	// Test case 2: Scheduler fails to add job
	{
		let ctx = MockJobScheduler::new_context();
		ctx.expect().returning(|| {
			let mut scheduler = MockJobScheduler::default();
			scheduler
				.expect_add()
				.returning(|_| Err("Failed to add job".into()));
			Ok(scheduler)
		});

		let service = BlockWatcherService::<_, MockJobScheduler>::new(sink.clone());
		let result = service
			.start_module_watcher(&network, Arc::new(ScriptedModule::new(MODULE, 10)))
			.await;

		assert!(matches!(
			result.unwrap_err(),
			BlockWatcherError::SchedulerError(_)
		));
	}

	// Test case 3: Scheduler fails to start
	{
		let ctx = MockJobScheduler::new_context();
		ctx.expect().returning(|| {
			let mut scheduler = MockJobScheduler::default();
			scheduler.expect_add().returning(|_| Ok(()));
			scheduler
				.expect_start()
				.times(1)
				.returning(|| Err("Failed to start scheduler".into()));
			Ok(scheduler)
		});

		let service = BlockWatcherService::<_, MockJobScheduler>::new(sink.clone());
		let result = service
			.start_module_watcher(&network, Arc::new(ScriptedModule::new(MODULE, 10)))
			.await;

		assert!(matches!(
			result.unwrap_err(),
			BlockWatcherError::SchedulerError(_)
		));
	}

	// Test case 4: Second start is a no-op, shutdown failure is reported
	{
		let ctx = MockJobScheduler::new_context();
		ctx.expect().times(1).returning(|| {
			let mut scheduler = MockJobScheduler::default();
			scheduler.expect_add().times(1).returning(|_| Ok(()));
			scheduler.expect_start().times(1).returning(|| Ok(()));
			scheduler
				.expect_shutdown()
				.returning(|| Err("Failed to shutdown scheduler".into()));
			Ok(scheduler)
		});

		let service = BlockWatcherService::<_, MockJobScheduler>::new(sink.clone());
		let module = Arc::new(ScriptedModule::new(MODULE, 10));
		service
			.start_module_watcher(&network, module.clone())
			.await
			.unwrap();
		service.start_module_watcher(&network, module).await.unwrap();

		assert_eq!(service.active_watchers.read().await.len(), 1);

		let result = service.stop_module_watcher(MODULE).await;
		assert!(matches!(
			result.unwrap_err(),
			BlockWatcherError::SchedulerError(_)
		));
	}
}
