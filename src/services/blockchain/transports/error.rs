//! Failures of a single node request.
//!
//! Rate limits and connection failures are retried on the next endpoint by the
//! endpoint manager; whatever still surfaces here reaches the modules as a requester
//! error.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error;

type Source = Option<Box<dyn std::error::Error + Send + Sync + 'static>>;

#[derive(Debug, Error)]
pub enum TransportError {
	/// The node answered with a status that is neither success nor accepted
	#[error("HTTP error: status {status_code} for URL {url}")]
	Http {
		status_code: reqwest::StatusCode,
		url: String,
		body: String,
		context: ErrorContext,
	},

	/// The node could not be reached or timed out
	#[error("Network error: {0}")]
	Network(ErrorContext),

	/// The body was not the JSON the request expects
	#[error("Failed to parse JSON response: {0}")]
	ResponseParse(ErrorContext),

	#[error("Failed to serialize request JSON: {0}")]
	RequestSerialization(ErrorContext),

	/// No fallback endpoint could take over
	#[error("URL rotation failed: {0}")]
	UrlRotation(ErrorContext),
}

impl TransportError {
	pub fn http(
		status_code: reqwest::StatusCode,
		url: String,
		body: String,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let context = ErrorContext::new_with_log(
			format!("HTTP error: status {} for URL {}", status_code, url),
			source,
			metadata,
		);
		Self::Http {
			status_code,
			url,
			body,
			context,
		}
	}

	pub fn network(msg: impl Into<String>, source: Source, metadata: Option<HashMap<String, String>>) -> Self {
		Self::Network(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn response_parse(
		msg: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ResponseParse(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn request_serialization(
		msg: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::RequestSerialization(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn url_rotation(
		msg: impl Into<String>,
		source: Source,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::UrlRotation(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn context(&self) -> &ErrorContext {
		match self {
			Self::Http { context, .. }
			| Self::Network(context)
			| Self::ResponseParse(context)
			| Self::RequestSerialization(context)
			| Self::UrlRotation(context) => context,
		}
	}

	/// Status of the node's answer, if it answered at all
	pub fn status_code(&self) -> Option<reqwest::StatusCode> {
		match self {
			Self::Http { status_code, .. } => Some(*status_code),
			_ => None,
		}
	}
}

impl TraceableError for TransportError {
	fn trace_id(&self) -> String {
		self.context().trace_id.clone()
	}
}
