//! Retrying HTTP client shared by every node transport.

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{
	policies::ExponentialBackoff, Jitter, RetryTransientMiddleware, RetryableStrategy,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Randomization of the pause between two attempts
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JitterSetting {
	None,
	#[default]
	Full,
}

impl From<JitterSetting> for Jitter {
	fn from(setting: JitterSetting) -> Self {
		match setting {
			JitterSetting::None => Jitter::None,
			JitterSetting::Full => Jitter::Full,
		}
	}
}

/// Exponential backoff applied to transient node failures before the endpoint manager
/// moves on to another URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct RetryConfig {
	/// Attempts after the first one
	pub max_retries: u32,
	pub base_for_backoff: u32,
	pub initial_backoff: Duration,
	pub max_backoff: Duration,
	pub jitter: JitterSetting,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_for_backoff: 2,
			initial_backoff: Duration::from_millis(250),
			max_backoff: Duration::from_secs(10),
			jitter: JitterSetting::Full,
		}
	}
}

impl RetryConfig {
	pub fn policy(&self) -> ExponentialBackoff {
		ExponentialBackoff::builder()
			.jitter(self.jitter.into())
			.base(self.base_for_backoff)
			.retry_bounds(self.initial_backoff, self.max_backoff)
			.build_with_max_retries(self.max_retries)
	}
}

/// Wraps `base_client` in retry middleware. `custom_strategy` decides which answers count
/// as transient; without one the reqwest-retry defaults apply.
pub fn create_retryable_http_client<S>(
	config: &RetryConfig,
	base_client: reqwest::Client,
	custom_strategy: Option<S>,
) -> ClientWithMiddleware
where
	S: RetryableStrategy + Send + Sync + 'static,
{
	let builder = ClientBuilder::new(base_client);
	let builder = match custom_strategy {
		Some(strategy) => builder.with(RetryTransientMiddleware::new_with_policy_and_strategy(
			config.policy(),
			strategy,
		)),
		None => builder.with(RetryTransientMiddleware::new_with_policy(config.policy())),
	};
	builder.build()
}
