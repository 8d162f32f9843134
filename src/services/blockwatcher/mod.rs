//! Block watcher service implementation.
//!
//! Drives the indexer: one cron-scheduled watcher per (network, module) pair processes
//! newly confirmed blocks in order and records its progress in the sink.

mod error;
mod service;

pub use error::BlockWatcherError;
pub use service::{
	process_new_blocks, BlockWatcherService, JobSchedulerTrait, ModuleBlockWatcher, WatcherRun,
};
