//! Secret resolution errors.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

pub type SecurityResult<T> = Result<T, Box<SecurityError>>;

#[derive(ThisError, Debug)]
pub enum SecurityError {
	/// The environment variable behind a secret is unset or not unicode
	#[error("Secret resolution error: {0}")]
	ResolveError(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl SecurityError {
	/// Builds the error for a secret read from `variable`. The variable name goes into the
	/// metadata, never its value.
	pub fn resolve_error(
		variable: &str,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
	) -> Self {
		Self::ResolveError(ErrorContext::new_with_log(
			format!("Failed to get environment variable {}", variable),
			source,
			Some(HashMap::from([("variable".to_string(), variable.to_string())])),
		))
	}
}

impl TraceableError for SecurityError {
	fn trace_id(&self) -> String {
		match self {
			Self::ResolveError(context) => context.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
