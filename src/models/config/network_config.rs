//! Network configuration loading and validation.
//!
//! One JSON file per network, each listing its nodes and the modules that index it.

use async_trait::async_trait;
use std::{
	collections::{HashMap, HashSet},
	path::Path,
	str::FromStr,
};

use crate::{
	models::{config::error::ConfigError, ConfigLoader, Network, SecretValue},
	utils::{get_cron_interval_ms, normalize_string},
};

const DEFAULT_NETWORKS_DIR: &str = "config/networks";

fn invalid(msg: impl Into<String>) -> ConfigError {
	ConfigError::validation_error(msg, None, None)
}

fn path_metadata(path: &Path) -> Option<HashMap<String, String>> {
	Some(HashMap::from([(
		"path".to_string(),
		path.display().to_string(),
	)]))
}

impl Network {
	/// Recommended lower bound of `max_past_blocks`.
	///
	/// `(cron_interval_ms / block_time_ms) + confirmation_blocks + 1`; a schedule that cannot
	/// be parsed contributes zero blocks per interval.
	pub fn get_recommended_past_blocks(&self) -> u64 {
		let cron_interval_ms = get_cron_interval_ms(&self.cron_schedule).unwrap_or(0) as u64;
		let blocks_per_cron = cron_interval_ms / self.block_time_ms.max(1);
		blocks_per_cron + self.confirmation_blocks + 1
	}

	fn validate_modules(&self) -> Result<(), ConfigError> {
		if self.modules.is_empty() {
			return Err(invalid("At least one module must be configured"));
		}

		let mut names = HashSet::new();
		for module in &self.modules {
			if module.kind.chain() != self.network_type {
				return Err(ConfigError::validation_error(
					format!(
						"Module {} cannot index a {:?} network",
						module.kind, self.network_type
					),
					None,
					Some(HashMap::from([
						("module".to_string(), module.kind.to_string()),
						("network".to_string(), self.slug.clone()),
					])),
				));
			}
			let name = module.resolved_name(&self.slug);
			if !names.insert(normalize_string(&name)) {
				return Err(ConfigError::validation_error(
					format!("Duplicate module name found: '{}'", name),
					None,
					Some(HashMap::from([("network".to_string(), self.slug.clone())])),
				));
			}
		}
		Ok(())
	}
}

#[async_trait]
impl ConfigLoader for Network {
	/// Resolve all secrets in the network configuration
	async fn resolve_secrets(&self) -> Result<Self, ConfigError> {
		dotenvy::dotenv().ok();
		let mut network = self.clone();

		for rpc_url in &mut network.rpc_urls {
			let resolved_url = rpc_url.url.resolve().await.map_err(|e| {
				ConfigError::parse_error(
					format!("failed to resolve RPC URL: {}", e),
					Some(Box::new(e)),
					None,
				)
			})?;
			rpc_url.url = SecretValue::Plain(resolved_url);
		}
		Ok(network)
	}

	/// Load all network configurations from a directory
	async fn load_all<T>(path: Option<&Path>) -> Result<T, ConfigError>
	where
		T: FromIterator<(String, Self)>,
	{
		let network_dir = path.unwrap_or(Path::new(DEFAULT_NETWORKS_DIR));
		if !network_dir.exists() {
			return Err(ConfigError::file_error(
				"networks directory not found",
				None,
				path_metadata(network_dir),
			));
		}

		let entries = std::fs::read_dir(network_dir).map_err(|e| {
			ConfigError::file_error(
				format!("failed to read networks directory: {}", e),
				Some(Box::new(e)),
				path_metadata(network_dir),
			)
		})?;

		let mut paths = Vec::new();
		for entry in entries {
			let entry = entry.map_err(|e| {
				ConfigError::file_error(
					format!("failed to read directory entry: {}", e),
					Some(Box::new(e)),
					path_metadata(network_dir),
				)
			})?;
			if Self::is_json_file(&entry.path()) {
				paths.push(entry.path());
			}
		}
		// Stable load order keeps duplicate reports deterministic
		paths.sort();

		let mut pairs: Vec<(String, Network)> = Vec::new();
		for path in paths {
			let name = path
				.file_stem()
				.and_then(|s| s.to_str())
				.unwrap_or("unknown")
				.to_string();
			let network = Self::load_from_path(&path).await?;

			let existing: Vec<&Network> = pairs.iter().map(|(_, network)| network).collect();
			Self::validate_uniqueness(&existing, &network, &path.display().to_string())?;

			pairs.push((name, network));
		}

		Ok(T::from_iter(pairs))
	}

	/// Load a network configuration from a specific file
	async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
		let file = std::fs::File::open(path).map_err(|e| {
			ConfigError::file_error(
				format!("failed to open network config file: {}", e),
				Some(Box::new(e)),
				path_metadata(path),
			)
		})?;
		let config: Network = serde_json::from_reader(file).map_err(|e| {
			ConfigError::parse_error(
				format!("failed to parse network config: {}", e),
				Some(Box::new(e)),
				path_metadata(path),
			)
		})?;

		let config = config.resolve_secrets().await?;
		config.validate()?;

		Ok(config)
	}

	/// Validate the network configuration
	fn validate(&self) -> Result<(), ConfigError> {
		if self.name.is_empty() {
			return Err(invalid("Network name is required"));
		}

		if self.slug.is_empty()
			|| !self
				.slug
				.chars()
				.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
		{
			return Err(invalid(
				"Slug must contain only lowercase letters, numbers, and underscores",
			));
		}

		let supported_types = ["rpc", "rest"];
		if !self
			.rpc_urls
			.iter()
			.all(|rpc_url| supported_types.contains(&rpc_url.type_.as_str()))
		{
			return Err(invalid(format!(
				"RPC URL type must be one of: {}",
				supported_types.join(", ")
			)));
		}

		if self.rpc_urls.is_empty() {
			return Err(invalid("At least one RPC URL is required"));
		}

		if !self.rpc_urls.iter().all(|rpc_url| {
			rpc_url.url.starts_with("http://") || rpc_url.url.starts_with("https://")
		}) {
			return Err(invalid("All RPC URLs must start with http:// or https://"));
		}

		if !self.rpc_urls.iter().all(|rpc_url| rpc_url.weight <= 100) {
			return Err(invalid("All RPC URL weights must be between 0 and 100"));
		}

		if self.block_time_ms < 100 {
			return Err(invalid("Block time must be at least 100ms"));
		}

		if self.confirmation_blocks == 0 {
			return Err(invalid("Confirmation blocks must be greater than 0"));
		}

		if self.cron_schedule.is_empty() {
			return Err(invalid("Cron schedule must be provided"));
		}

		if let Err(e) = cron::Schedule::from_str(&self.cron_schedule) {
			return Err(ConfigError::validation_error(e.to_string(), None, None));
		}

		if self.max_concurrency == Some(0) {
			return Err(invalid("max_concurrency must be greater than 0"));
		}

		if self.request_timeout_ms == Some(0) {
			return Err(invalid("request_timeout_ms must be greater than 0"));
		}

		if let Some(max_blocks) = self.max_past_blocks {
			if max_blocks == 0 {
				return Err(invalid("max_past_blocks must be greater than 0"));
			}

			let recommended_blocks = self.get_recommended_past_blocks();
			if max_blocks < recommended_blocks {
				tracing::warn!(
					"Network '{}' max_past_blocks ({}) below recommended {} \
					 (cron_interval/block_time + confirmations + 1)",
					self.slug,
					max_blocks,
					recommended_blocks
				);
			}
		}

		self.validate_modules()?;
		self.validate_protocol();

		Ok(())
	}

	/// Logs a warning for every plain-text endpoint
	fn validate_protocol(&self) {
		for rpc_url in &self.rpc_urls {
			if rpc_url.url.starts_with("http://") {
				tracing::warn!(
					"Network '{}' uses an insecure RPC URL: {}",
					self.slug,
					rpc_url.url.as_str()
				);
			}
		}
	}

	fn validate_uniqueness(
		instances: &[&Self],
		current_instance: &Self,
		file_path: &str,
	) -> Result<(), ConfigError> {
		let fields: [(&str, fn(&Network) -> &String); 2] =
			[("name", |network| &network.name), ("slug", |network| &network.slug)];

		for (field_name, field) in fields {
			let value = field(current_instance);
			if instances
				.iter()
				.any(|existing| normalize_string(field(existing)) == normalize_string(value))
			{
				return Err(ConfigError::validation_error(
					format!("Duplicate network {} found: '{}'", field_name, value),
					None,
					Some(HashMap::from([
						(format!("network_{}", field_name), value.to_string()),
						("path".to_string(), file_path.to_string()),
					])),
				));
			}
		}
		Ok(())
	}
}
