//! Configuration loading and validation.
//!
//! Network definitions are read from JSON files, their secrets resolved and the result
//! validated before any module is built from them.

#![allow(clippy::result_large_err)]

use async_trait::async_trait;
use std::path::Path;

mod error;
mod network_config;

pub use error::ConfigError;

/// Loading of one kind of configuration file, keyed by file stem
#[async_trait]
pub trait ConfigLoader: Sized {
	/// Loads, resolves and validates every JSON file of `path`, or of the default
	/// directory when `path` is `None`
	async fn load_all<T>(path: Option<&Path>) -> Result<T, ConfigError>
	where
		T: FromIterator<(String, Self)>;

	async fn load_from_path(path: &Path) -> Result<Self, ConfigError>;

	fn validate(&self) -> Result<(), ConfigError>;

	/// Warns about settings that work but are unsafe, such as plain `http` node URLs
	fn validate_protocol(&self);

	fn is_json_file(path: &Path) -> bool {
		path.extension()
			.is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
	}

	/// Copy of `self` with every secret replaced by its plain value
	async fn resolve_secrets(&self) -> Result<Self, ConfigError>;

	/// Fails when `current_instance` reuses an identifying field of one of `instances`.
	/// `file_path` only feeds the error metadata.
	fn validate_uniqueness(
		instances: &[&Self],
		current_instance: &Self,
		file_path: &str,
	) -> Result<(), ConfigError>;
}
