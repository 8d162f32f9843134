//! Failures of a watcher tick.
//!
//! A tick fails because of the scheduler, the nodes, the block itself, or the sink. Only
//! failures of the block itself stop the watcher; the others are retried on the next tick.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

type Source = Option<Box<dyn std::error::Error + Send + Sync + 'static>>;

#[derive(ThisError, Debug)]
pub enum BlockWatcherError {
	/// The cron job could not be created, added, started or stopped
	#[error("Scheduler error: {0}")]
	SchedulerError(ErrorContext),

	/// Nodes were unreachable or gave no usable answer
	#[error("Network error: {0}")]
	NetworkError(ErrorContext),

	/// The block failed consensus, integrity or module checks
	#[error("Processing error: {0}")]
	ProcessingError(ErrorContext),

	/// The sink could not be read or written
	#[error("Storage error: {0}")]
	StorageError(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl BlockWatcherError {
	pub fn scheduler_error(
		msg: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::SchedulerError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn network_error(
		msg: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::NetworkError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn processing_error(
		msg: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ProcessingError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn storage_error(
		msg: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::StorageError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn context(&self) -> Option<&ErrorContext> {
		match self {
			Self::SchedulerError(context)
			| Self::NetworkError(context)
			| Self::ProcessingError(context)
			| Self::StorageError(context) => Some(context),
			Self::Other(_) => None,
		}
	}

	/// Whether the watcher must stop instead of retrying on its next tick
	pub fn halts_watcher(&self) -> bool {
		matches!(self, Self::ProcessingError(_))
	}
}

impl TraceableError for BlockWatcherError {
	fn trace_id(&self) -> String {
		self.context()
			.map(|context| context.trace_id.clone())
			.unwrap_or_else(|| Uuid::new_v4().to_string())
	}
}
