//! Structured error context shared by every error type of the crate.
//!
//! [`ErrorContext`] carries a message, optional key/value metadata, the underlying cause,
//! a timestamp and a trace id. Wrapping an error that already has a trace id reuses it,
//! so all log lines produced while a block fails share one id.

use chrono::Utc;
use std::{collections::HashMap, fmt};
use uuid::Uuid;

type Source = Option<Box<dyn std::error::Error + Send + Sync + 'static>>;

/// How many causes are inspected when looking for an existing trace id
const TRACE_ID_SEARCH_DEPTH: usize = 3;

#[derive(Debug)]
pub struct ErrorContext {
	pub message: String,
	pub source: Source,
	pub metadata: Option<HashMap<String, String>>,
	/// RFC 3339
	pub timestamp: String,
	pub trace_id: String,
}

impl ErrorContext {
	/// Builds a context, inheriting the trace id of `source` when it has one
	pub fn new(
		message: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let trace_id = match &source {
			Some(cause) => TraceableError::trace_id(cause.as_ref()),
			None => Uuid::new_v4().to_string(),
		};
		Self {
			message: message.into(),
			source,
			metadata,
			timestamp: Utc::now().to_rfc3339(),
			trace_id,
		}
	}

	/// Same as [`ErrorContext::new`], and emits the error at `error` level
	pub fn new_with_log(
		message: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let context = Self::new(message, source, metadata);
		log_error(&context);
		context
	}

	pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.metadata
			.get_or_insert_with(HashMap::new)
			.insert(key.into(), value.into());
		self
	}

	pub fn metadata_value(&self, key: &str) -> Option<&str> {
		self.metadata
			.as_ref()
			.and_then(|metadata| metadata.get(key))
			.map(String::as_str)
	}

	/// `message [a=1, b=2]`, keys in alphabetical order
	pub fn format_with_metadata(&self) -> String {
		let Some(metadata) = self.metadata.as_ref().filter(|m| !m.is_empty()) else {
			return self.message.clone();
		};
		let mut pairs: Vec<(&String, &String)> = metadata.iter().collect();
		pairs.sort();
		let rendered: Vec<String> = pairs
			.into_iter()
			.map(|(key, value)| format!("{}={}", key, value))
			.collect();
		format!("{} [{}]", self.message, rendered.join(", "))
	}
}

impl fmt::Display for ErrorContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.format_with_metadata())
	}
}

impl std::error::Error for ErrorContext {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.source
			.as_ref()
			.map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
	}
}

/// Errors that expose the trace id of their context
pub trait TraceableError: std::error::Error + Send + Sync {
	fn trace_id(&self) -> String;
}

impl TraceableError for dyn std::error::Error + Send + Sync + 'static {
	fn trace_id(&self) -> String {
		let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
		for _ in 0..=TRACE_ID_SEARCH_DEPTH {
			let Some(error) = current else {
				break;
			};
			if let Some(id) = known_trace_id(error) {
				return id;
			}
			current = error.source();
		}
		Uuid::new_v4().to_string()
	}
}

fn known_trace_id(err: &(dyn std::error::Error + 'static)) -> Option<String> {
	if let Some(context) = err.downcast_ref::<ErrorContext>() {
		return Some(context.trace_id.clone());
	}

	macro_rules! downcast_trace_id {
		($($ty:path),*) => {
			$(
				if let Some(e) = err.downcast_ref::<$ty>() {
					return Some(e.trace_id());
				}
			)*
		}
	}

	downcast_trace_id!(
		crate::services::indexer::IndexerError,
		crate::services::blockwatcher::BlockWatcherError,
		crate::services::blockchain::TransportError,
		crate::utils::decimal::DecimalError,
		crate::models::ConfigError,
		crate::models::SecurityError
	);
	None
}

/// Cuts gateway error pages down to the text before the markup
fn strip_html(message: &str) -> &str {
	let is_html = ["<html", "<head", "<body", "<!DOCTYPE"]
		.iter()
		.any(|tag| message.contains(tag));
	match message.find('<') {
		Some(pos) if is_html => message[..pos].trim(),
		_ => message,
	}
}

fn format_error_chain(err: &dyn std::error::Error) -> String {
	let mut chain = strip_html(&err.to_string()).to_string();
	let mut cause = err.source();
	while let Some(err) = cause {
		chain.push_str("\n\tCaused by: ");
		chain.push_str(strip_html(&err.to_string()));
		cause = err.source();
	}
	chain
}

fn log_error(error: &ErrorContext) {
	match &error.source {
		Some(cause) => tracing::error!(
			message = error.format_with_metadata(),
			trace_id = %error.trace_id,
			timestamp = %error.timestamp,
			error.chain = %format_error_chain(cause.as_ref()),
			"Error occurred"
		),
		None => tracing::error!(
			message = error.format_with_metadata(),
			trace_id = %error.trace_id,
			timestamp = %error.timestamp,
			"Error occurred"
		),
	}
}
