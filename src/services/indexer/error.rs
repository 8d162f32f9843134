//! Indexer error taxonomy.
//!
//! Failures of block processing fall into four statically distinguishable kinds so the
//! orchestrator can decide whether to retry, halt or refuse to start:
//!
//! - `RequesterError`: a node could not be reached or answered with an error. Retryable.
//! - `ConsensusError`: queried nodes disagree on the identity of a block.
//! - `IntegrityError`: chain data is malformed or internally inconsistent.
//! - `DeveloperError`: a module is misconfigured, detected at construction.

use crate::{
	models::ConfigError,
	services::blockchain::TransportError,
	utils::{
		decimal::DecimalError,
		logging::error::{ErrorContext, TraceableError},
	},
};
use std::collections::HashMap;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum IndexerError {
	/// Node unreachable, timed out, unexpected HTTP status or JSON-RPC error object
	#[error("Requester error: {0}")]
	RequesterError(ErrorContext),

	/// Nodes returned different identities for the same block
	#[error("Consensus error: {0}")]
	ConsensusError(ErrorContext),

	/// Malformed or inconsistent chain data
	#[error("Integrity error: {0}")]
	IntegrityError(ErrorContext),

	/// Missing or invalid module configuration
	#[error("Developer error: {0}")]
	DeveloperError(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl IndexerError {
	pub fn requester_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::RequesterError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn consensus_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ConsensusError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn integrity_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::IntegrityError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn developer_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::DeveloperError(ErrorContext::new_with_log(msg, source, metadata))
	}

	/// Only node-side failures are worth retrying; everything else needs an operator.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::RequesterError(_))
	}

	/// Shorthand for an integrity error carrying a single metadata pair
	pub fn malformed(msg: impl Into<String>, key: &str, value: impl ToString) -> Self {
		Self::integrity_error(
			msg,
			None,
			Some(HashMap::from([(key.to_string(), value.to_string())])),
		)
	}

	pub fn context(&self) -> Option<&ErrorContext> {
		match self {
			Self::RequesterError(ctx)
			| Self::ConsensusError(ctx)
			| Self::IntegrityError(ctx)
			| Self::DeveloperError(ctx) => Some(ctx),
			Self::Other(_) => None,
		}
	}
}

impl TraceableError for IndexerError {
	fn trace_id(&self) -> String {
		self.context()
			.map(|ctx| ctx.trace_id.clone())
			.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
	}
}

impl From<TransportError> for IndexerError {
	fn from(error: TransportError) -> Self {
		let msg = error.to_string();
		let metadata = error
			.status_code()
			.map(|status| HashMap::from([("status".to_string(), status.as_u16().to_string())]));
		Self::requester_error(msg, Some(Box::new(error)), metadata)
	}
}

impl From<DecimalError> for IndexerError {
	fn from(error: DecimalError) -> Self {
		let msg = error.to_string();
		Self::integrity_error(msg, Some(Box::new(error)), None)
	}
}

impl From<ConfigError> for IndexerError {
	fn from(error: ConfigError) -> Self {
		let msg = error.to_string();
		Self::developer_error(msg, Some(Box::new(error)), None)
	}
}
