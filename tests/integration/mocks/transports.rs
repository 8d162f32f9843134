use mockall::mock;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

use multichain_indexer::services::blockchain::{
	BlockchainTransport, RestRequest, RotatingTransport, TransportError,
};

// Mock implementation of a node transport.
// Answers JSON-RPC envelopes and REST bodies from expectations set by each test.
mock! {
	pub NodeTransport {
		pub async fn send_raw_request(&self, method: &str, params: Option<Value>) -> Result<Value, TransportError>;
		pub async fn send_rest_request(&self, request: &RestRequest) -> Result<Value, TransportError>;
		pub async fn get_current_url(&self) -> String;
	}
}

#[async_trait::async_trait]
impl BlockchainTransport for MockNodeTransport {
	async fn get_current_url(&self) -> String {
		self.get_current_url().await
	}

	async fn send_raw_request<P>(
		&self,
		method: &str,
		params: Option<P>,
	) -> Result<Value, TransportError>
	where
		P: Into<Value> + Send + Clone + Serialize,
	{
		self.send_raw_request(method, params.map(|p| p.into()))
			.await
	}

	async fn send_rest_request(&self, request: &RestRequest) -> Result<Value, TransportError> {
		self.send_rest_request(request).await
	}

	fn update_endpoint_manager_client(
		&mut self,
		_: ClientWithMiddleware,
	) -> Result<(), anyhow::Error> {
		Ok(())
	}
}

#[async_trait::async_trait]
impl RotatingTransport for MockNodeTransport {
	async fn try_connect(&self, _url: &str) -> Result<(), anyhow::Error> {
		Ok(())
	}

	async fn update_client(&self, _url: &str) -> Result<(), anyhow::Error> {
		Ok(())
	}
}

/// Envelope of a successful JSON-RPC call
pub fn rpc_result(result: Value) -> Value {
	json!({"jsonrpc": "2.0", "id": 1, "result": result})
}

/// Node transport pinned to `url` that answers every call with `hash`
///
/// Used for identity verification tests, where only the URL and the reported hash matter.
pub fn node_reporting(url: &'static str, hash: &'static str) -> MockNodeTransport {
	let mut node = MockNodeTransport::new();
	node.expect_get_current_url()
		.returning(move || url.to_string());
	node.expect_send_raw_request()
		.returning(move |_, _| Ok(rpc_result(json!({"hash": hash}))));
	node
}

// Mock transport that always fails to update the client
// Used for testing URL update failure scenarios in rotating transports.
#[derive(Clone)]
pub struct AlwaysFailsToUpdateClientTransport {
	pub current_url: Arc<RwLock<String>>,
}

#[async_trait::async_trait]
impl BlockchainTransport for AlwaysFailsToUpdateClientTransport {
	async fn get_current_url(&self) -> String {
		self.current_url.read().await.clone()
	}

	async fn send_raw_request<P: Into<Value> + Send + Clone + Serialize>(
		&self,
		_method: &str,
		_params: Option<P>,
	) -> Result<Value, TransportError> {
		Ok(rpc_result(json!("mocked_response")))
	}

	async fn send_rest_request(&self, _request: &RestRequest) -> Result<Value, TransportError> {
		Ok(json!({}))
	}

	fn update_endpoint_manager_client(
		&mut self,
		_: ClientWithMiddleware,
	) -> Result<(), anyhow::Error> {
		Ok(())
	}
}

#[async_trait::async_trait]
impl RotatingTransport for AlwaysFailsToUpdateClientTransport {
	async fn try_connect(&self, _url: &str) -> Result<(), anyhow::Error> {
		Ok(())
	}

	async fn update_client(&self, _url: &str) -> Result<(), anyhow::Error> {
		Err(anyhow::anyhow!("Simulated client update failure"))
	}
}

// Rotating transport whose connection check is a real GET against the candidate URL.
// Used to drive the endpoint manager against mockito servers.
#[derive(Clone)]
pub struct MockTransport {
	client: reqwest::Client,
	current_url: Arc<RwLock<String>>,
}

impl MockTransport {
	pub fn new() -> Self {
		Self {
			client: reqwest::Client::new(),
			current_url: Arc::new(RwLock::new(String::new())),
		}
	}
}

#[async_trait::async_trait]
impl BlockchainTransport for MockTransport {
	async fn get_current_url(&self) -> String {
		self.current_url.read().await.clone()
	}

	async fn send_raw_request<P: Into<Value> + Send + Clone + Serialize>(
		&self,
		_method: &str,
		_params: Option<P>,
	) -> Result<Value, TransportError> {
		Ok(rpc_result(json!("mocked_response")))
	}

	async fn send_rest_request(&self, _request: &RestRequest) -> Result<Value, TransportError> {
		Ok(json!({}))
	}

	fn update_endpoint_manager_client(
		&mut self,
		_: ClientWithMiddleware,
	) -> Result<(), anyhow::Error> {
		Ok(())
	}
}

#[async_trait::async_trait]
impl RotatingTransport for MockTransport {
	async fn try_connect(&self, url: &str) -> Result<(), anyhow::Error> {
		match self.client.get(url).send().await {
			Ok(_) => Ok(()),
			Err(e) => Err(anyhow::anyhow!("Failed to connect: {}", e)),
		}
	}

	async fn update_client(&self, url: &str) -> Result<(), anyhow::Error> {
		*self.current_url.write().await = url.to_string();
		Ok(())
	}
}
