//! Errors raised while loading network configuration.
//!
//! The constructors do not log: whoever loads the configuration decides whether a bad
//! file stops startup or is only reported.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

type Source = Option<Box<dyn std::error::Error + Send + Sync + 'static>>;

#[derive(ThisError, Debug)]
pub enum ConfigError {
	/// The file parsed but describes an unusable network
	#[error("Validation error: {0}")]
	ValidationError(ErrorContext),

	/// The file is not valid network JSON, or one of its secrets cannot be resolved
	#[error("Parse error: {0}")]
	ParseError(ErrorContext),

	/// The directory or file could not be read
	#[error("File error: {0}")]
	FileError(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl ConfigError {
	pub fn validation_error(
		msg: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ValidationError(ErrorContext::new(msg, source, metadata))
	}

	pub fn parse_error(
		msg: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ParseError(ErrorContext::new(msg, source, metadata))
	}

	pub fn file_error(
		msg: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::FileError(ErrorContext::new(msg, source, metadata))
	}

	pub fn context(&self) -> Option<&ErrorContext> {
		match self {
			Self::ValidationError(context) | Self::ParseError(context) | Self::FileError(context) => {
				Some(context)
			}
			Self::Other(_) => None,
		}
	}
}

impl TraceableError for ConfigError {
	fn trace_id(&self) -> String {
		self.context()
			.map(|context| context.trace_id.clone())
			.unwrap_or_else(|| Uuid::new_v4().to_string())
	}
}
