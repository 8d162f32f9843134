//! HTTP transport shared by every chain family.
//!
//! The same client speaks JSON-RPC and REST. Which request proves that a node is alive
//! depends on the chain and is given by a [`ConnectionCheck`].

use anyhow::Context;
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::{
	models::Network,
	services::blockchain::transports::{
		BlockchainTransport, ConnectionCheck, EndpointManager, RestRequest, RotatingTransport,
		TransientErrorRetryStrategy, TransportError,
	},
	utils::http::{create_retryable_http_client, RetryConfig},
};

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 32;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Cheap to clone; clones share the connection pool and the endpoint state
#[derive(Clone, Debug)]
pub struct HttpTransportClient {
	client: ClientWithMiddleware,
	endpoint_manager: EndpointManager,
	check: ConnectionCheck,
}

fn build_client(timeout: Duration) -> Result<ClientWithMiddleware, anyhow::Error> {
	let base = reqwest::ClientBuilder::new()
		.pool_idle_timeout(POOL_IDLE_TIMEOUT)
		.pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
		.connect_timeout(CONNECT_TIMEOUT)
		.timeout(timeout)
		.build()
		.context("Failed to create base HTTP client")?;
	Ok(create_retryable_http_client(
		&RetryConfig::default(),
		base,
		Some(TransientErrorRetryStrategy),
	))
}

/// Parses `url` and drops any trailing slash so REST paths can be appended
fn normalize_url(url: &str) -> Result<String, anyhow::Error> {
	let parsed = Url::parse(url).map_err(|_| anyhow::anyhow!("Invalid URL: {}", url))?;
	Ok(parsed.as_str().trim_end_matches('/').to_string())
}

async fn check_url(
	client: &ClientWithMiddleware,
	check: &ConnectionCheck,
	url: &str,
) -> Result<(), anyhow::Error> {
	let response = check
		.build(client, url)
		.send()
		.await
		.map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", url, e))?;
	let status = response.status();
	if !status.is_success() {
		anyhow::bail!("Failed to connect to {}: {}", url, status.as_u16());
	}
	Ok(())
}

impl HttpTransportClient {
	/// Connects to the highest-weight `rpc` URL of `network` that passes the check.
	///
	/// URLs with weight 0 are never used. The remaining valid URLs become fallbacks.
	pub async fn new(network: &Network, check: ConnectionCheck) -> Result<Self, anyhow::Error> {
		let client = build_client(Duration::from_millis(network.request_timeout_ms()))?;
		let candidates: Vec<String> = network
			.weighted_rpc_urls()
			.into_iter()
			.filter(|rpc_url| rpc_url.weight > 0)
			.filter_map(|rpc_url| normalize_url(rpc_url.url.as_str()).ok())
			.collect();

		for (index, url) in candidates.iter().enumerate() {
			if let Err(e) = check_url(&client, &check, url).await {
				tracing::debug!(network = %network.slug, "Node check failed: {}", e);
				continue;
			}

			let fallback_urls: Vec<String> = candidates
				.iter()
				.enumerate()
				.filter(|(other, _)| *other != index)
				.map(|(_, fallback)| fallback.clone())
				.collect();
			tracing::debug!(
				network = %network.slug,
				active = %url,
				fallbacks = fallback_urls.len(),
				"Connected to node"
			);
			return Ok(Self {
				endpoint_manager: EndpointManager::new(client.clone(), url, fallback_urls),
				client,
				check,
			});
		}

		Err(anyhow::anyhow!("All RPC URLs failed to connect"))
	}

	/// Transport fixed on `url`, with no fallbacks and no initial check. Consensus uses
	/// one per node so answers cannot come from a rotated endpoint.
	pub fn for_url(
		url: &str,
		check: ConnectionCheck,
		timeout: Duration,
	) -> Result<Self, anyhow::Error> {
		let url = normalize_url(url)?;
		let client = build_client(timeout)?;
		Ok(Self {
			endpoint_manager: EndpointManager::new(client.clone(), &url, Vec::new()),
			client,
			check,
		})
	}
}

#[async_trait]
impl BlockchainTransport for HttpTransportClient {
	async fn get_current_url(&self) -> String {
		self.endpoint_manager.active_url.read().await.clone()
	}

	async fn send_raw_request<P>(
		&self,
		method: &str,
		params: Option<P>,
	) -> Result<Value, TransportError>
	where
		P: Into<Value> + Send + Clone + Serialize,
	{
		self.endpoint_manager
			.send_raw_request(self, method, params)
			.await
	}

	async fn send_rest_request(&self, request: &RestRequest) -> Result<Value, TransportError> {
		self.endpoint_manager.send_rest_request(self, request).await
	}

	fn update_endpoint_manager_client(
		&mut self,
		client: ClientWithMiddleware,
	) -> Result<(), anyhow::Error> {
		self.endpoint_manager.update_client(client);
		Ok(())
	}
}

#[async_trait]
impl RotatingTransport for HttpTransportClient {
	async fn try_connect(&self, url: &str) -> Result<(), anyhow::Error> {
		check_url(&self.client, &self.check, &normalize_url(url)?).await
	}

	async fn update_client(&self, url: &str) -> Result<(), anyhow::Error> {
		let url = normalize_url(url)?;
		*self.endpoint_manager.active_url.write().await = url;
		Ok(())
	}
}
