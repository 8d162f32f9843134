//! Network transport implementations for node communication.
//!
//! One HTTP transport serves every chain family. JSON-RPC calls and REST calls share the
//! same endpoint rotation path; what differs per chain is the [`ConnectionCheck`] used to
//! check that a node answers before it becomes the active endpoint.

mod endpoint_manager;
mod error;
mod http;
mod request;

pub use endpoint_manager::EndpointManager;
pub use error::TransportError;
pub use http::HttpTransportClient;
pub use request::{ConnectionCheck, RestMethod, RestRequest};

use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{
	default_on_request_failure, default_on_request_success, Retryable, RetryableStrategy,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Statuses after which the request moves to a fallback URL instead of failing
pub const ROTATE_ON_ERROR_CODES: [u16; 1] = [429];

/// A node endpoint the requester can talk to
#[async_trait::async_trait]
pub trait BlockchainTransport: Send + Sync {
	async fn get_current_url(&self) -> String;

	/// Posts a JSON-RPC 2.0 call and returns the whole envelope, `result` or `error`
	async fn send_raw_request<P>(
		&self,
		method: &str,
		params: Option<P>,
	) -> Result<Value, TransportError>
	where
		P: Into<Value> + Send + Clone + Serialize;

	/// Calls a REST path below the active URL. A status listed in `accepted_statuses`
	/// yields `Value::Null`.
	async fn send_rest_request(&self, request: &RestRequest) -> Result<Value, TransportError>;

	/// Builds the JSON-RPC envelope; nodes with a different dialect override it
	async fn customize_request<P>(&self, method: &str, params: Option<P>) -> Value
	where
		P: Into<Value> + Send + Clone + Serialize,
	{
		json!({
			"jsonrpc": "2.0",
			"id": 1,
			"method": method,
			"params": params.map(Into::into),
		})
	}

	fn update_endpoint_manager_client(
		&mut self,
		client: ClientWithMiddleware,
	) -> Result<(), anyhow::Error>;
}

/// Transport whose active URL can move to a fallback
#[async_trait::async_trait]
pub trait RotatingTransport: BlockchainTransport {
	/// Checks `url` without switching to it
	async fn try_connect(&self, url: &str) -> Result<(), anyhow::Error>;

	/// Points the transport at `url`
	async fn update_client(&self, url: &str) -> Result<(), anyhow::Error>;
}

/// Retries 5xx answers, timeouts and dropped connections on the same URL before the
/// endpoint manager gets to rotate
pub struct TransientErrorRetryStrategy;

impl RetryableStrategy for TransientErrorRetryStrategy {
	fn handle(
		&self,
		res: &Result<reqwest::Response, reqwest_middleware::Error>,
	) -> Option<Retryable> {
		res.as_ref()
			.map_or_else(default_on_request_failure, default_on_request_success)
	}
}
