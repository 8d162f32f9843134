//! Node requester: single and bounded-concurrency batch calls.
//!
//! JSON-RPC responses are unwrapped here. The `result` member is deserialized into the
//! caller's type; an `error` member becomes a [`IndexerError::RequesterError`] carrying the
//! node's code and message; a body with neither is an [`IndexerError::IntegrityError`].
//!
//! Batches are issued concurrently, at most `limit` at a time. Completion order is not
//! preserved by the transport, so every result is tagged with its call id and the batch is
//! re-sorted before being handed back.

use futures::{stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::instrument;

use crate::services::{
	blockchain::transports::{BlockchainTransport, RestRequest},
	indexer::IndexerError,
};

/// Outcome of a JSON-RPC call that reached the node
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
	Result(Value),
	Error { code: i64, message: String },
}

impl RpcOutcome {
	fn from_envelope(method: &str, envelope: Value) -> Result<Self, IndexerError> {
		let mut envelope = match envelope {
			Value::Object(map) => map,
			other => {
				return Err(IndexerError::integrity_error(
					"JSON-RPC response is not an object",
					None,
					Some(HashMap::from([
						("method".to_string(), method.to_string()),
						("response".to_string(), other.to_string()),
					])),
				))
			}
		};

		if let Some(error) = envelope.remove("error").filter(|error| !error.is_null()) {
			let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
			let message = error
				.get("message")
				.and_then(Value::as_str)
				.map(str::to_string)
				.unwrap_or_else(|| error.to_string());
			return Ok(RpcOutcome::Error { code, message });
		}

		match envelope.remove("result") {
			Some(result) => Ok(RpcOutcome::Result(result)),
			None => Err(IndexerError::malformed(
				"JSON-RPC response has no result",
				"method",
				method,
			)),
		}
	}

	/// Converts a node-side error into a requester error
	pub fn into_result(self, method: &str) -> Result<Value, IndexerError> {
		match self {
			RpcOutcome::Result(value) => Ok(value),
			RpcOutcome::Error { code, message } => Err(IndexerError::requester_error(
				format!("{} failed: {}", method, message),
				None,
				Some(HashMap::from([
					("method".to_string(), method.to_string()),
					("code".to_string(), code.to_string()),
					("message".to_string(), message),
				])),
			)),
		}
	}
}

/// One call of a batch; `id` orders the results
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
	pub id: usize,
	pub method: String,
	pub params: Value,
}

impl RpcCall {
	pub fn new(id: usize, method: &str, params: Value) -> Self {
		Self {
			id,
			method: method.to_string(),
			params,
		}
	}
}

/// Deserializes a node payload, reporting shape mismatches as integrity errors
pub fn decode<R: DeserializeOwned>(what: &str, value: Value) -> Result<R, IndexerError> {
	serde_json::from_value(value).map_err(|e| {
		IndexerError::integrity_error(
			format!("Malformed response for {}: {}", what, e),
			Some(Box::new(e)),
			Some(HashMap::from([("request".to_string(), what.to_string())])),
		)
	})
}

/// Issues one JSON-RPC call and returns the outcome without judging it
#[instrument(skip(transport, params))]
pub async fn call<T: BlockchainTransport>(
	transport: &T,
	method: &str,
	params: Value,
) -> Result<RpcOutcome, IndexerError> {
	let envelope = transport.send_raw_request(method, Some(params)).await?;
	RpcOutcome::from_envelope(method, envelope)
}

/// Issues one JSON-RPC call and deserializes its `result`
pub async fn request_single<T, R>(transport: &T, method: &str, params: Value) -> Result<R, IndexerError>
where
	T: BlockchainTransport,
	R: DeserializeOwned,
{
	let result = call(transport, method, params).await?.into_result(method)?;
	decode(method, result)
}

/// Issues every call concurrently and returns the outcomes in id order
pub async fn call_batch<T: BlockchainTransport>(
	transport: &T,
	calls: Vec<RpcCall>,
	limit: usize,
) -> Result<Vec<(RpcCall, RpcOutcome)>, IndexerError> {
	let mut results: Vec<(RpcCall, RpcOutcome)> = stream::iter(calls)
		.map(|rpc_call| async move {
			let outcome = call(transport, &rpc_call.method, rpc_call.params.clone()).await?;
			Ok::<_, IndexerError>((rpc_call, outcome))
		})
		.buffer_unordered(limit.max(1))
		.collect::<Vec<_>>()
		.await
		.into_iter()
		.collect::<Result<_, _>>()?;
	results.sort_by_key(|(rpc_call, _)| rpc_call.id);
	Ok(results)
}

/// Batch twin of [`request_single`]; one failed call fails the batch
pub async fn request_batch<T, R>(
	transport: &T,
	calls: Vec<RpcCall>,
	limit: usize,
) -> Result<Vec<R>, IndexerError>
where
	T: BlockchainTransport,
	R: DeserializeOwned,
{
	call_batch(transport, calls, limit)
		.await?
		.into_iter()
		.map(|(rpc_call, outcome)| {
			let result = outcome.into_result(&rpc_call.method)?;
			decode(&rpc_call.method, result)
		})
		.collect()
}

/// Issues one REST call and deserializes the body
///
/// Accepted non-2xx statuses arrive as `null`, so `R` is usually an `Option` for such calls.
#[instrument(skip(transport, request), fields(path = %request.path))]
pub async fn rest_single<T, R>(transport: &T, request: &RestRequest) -> Result<R, IndexerError>
where
	T: BlockchainTransport,
	R: DeserializeOwned,
{
	let body = transport.send_rest_request(request).await?;
	decode(&request.path, body)
}

/// REST twin of [`request_batch`]; results follow the order of `requests`
pub async fn rest_batch<T, R>(
	transport: &T,
	requests: Vec<RestRequest>,
	limit: usize,
) -> Result<Vec<R>, IndexerError>
where
	T: BlockchainTransport,
	R: DeserializeOwned,
{
	let mut results: Vec<(usize, R)> = stream::iter(requests.into_iter().enumerate())
		.map(|(index, request)| async move {
			let decoded: R = rest_single(transport, &request).await?;
			Ok::<_, IndexerError>((index, decoded))
		})
		.buffer_unordered(limit.max(1))
		.collect::<Vec<_>>()
		.await
		.into_iter()
		.collect::<Result<_, _>>()?;
	results.sort_by_key(|(index, _)| *index);
	Ok(results.into_iter().map(|(_, decoded)| decoded).collect())
}

/// Transports one module talks to
///
/// `primary` rotates over every configured URL and serves data fetches; `nodes` holds one
/// transport pinned to each URL taking part in identity verification; `rest` is the
/// optional secondary REST endpoint of chains that split RPC and REST (Cosmos).
#[derive(Debug)]
pub struct NodeSet<T> {
	pub primary: Arc<T>,
	pub nodes: Vec<Arc<T>>,
	pub rest: Option<Arc<T>>,
	pub limit: usize,
	pub timeout: Duration,
}

impl<T> Clone for NodeSet<T> {
	fn clone(&self) -> Self {
		Self {
			primary: self.primary.clone(),
			nodes: self.nodes.clone(),
			rest: self.rest.clone(),
			limit: self.limit,
			timeout: self.timeout,
		}
	}
}

impl<T: BlockchainTransport> NodeSet<T> {
	pub fn new(primary: T, nodes: Vec<T>, limit: usize, timeout: Duration) -> Self {
		Self {
			primary: Arc::new(primary),
			nodes: nodes.into_iter().map(Arc::new).collect(),
			rest: None,
			limit: limit.max(1),
			timeout,
		}
	}

	/// One transport serving both data and identity, as used by one-node setups and tests
	pub fn single(transport: T, limit: usize) -> Self {
		let primary = Arc::new(transport);
		Self {
			nodes: vec![primary.clone()],
			primary,
			rest: None,
			limit: limit.max(1),
			timeout: Duration::from_secs(30),
		}
	}

	pub fn with_rest(mut self, rest: T) -> Self {
		self.rest = Some(Arc::new(rest));
		self
	}

	/// Nodes taking part in identity verification, never empty
	pub fn consensus_nodes(&self) -> Vec<Arc<T>> {
		if self.nodes.is_empty() {
			vec![self.primary.clone()]
		} else {
			self.nodes.clone()
		}
	}

	/// Transport for REST calls of chains with a separate REST endpoint
	pub fn rest_transport(&self) -> &T {
		self.rest.as_deref().unwrap_or(self.primary.as_ref())
	}

	pub async fn call(&self, method: &str, params: Value) -> Result<RpcOutcome, IndexerError> {
		call(self.primary.as_ref(), method, params).await
	}

	pub async fn request<R: DeserializeOwned>(
		&self,
		method: &str,
		params: Value,
	) -> Result<R, IndexerError> {
		request_single(self.primary.as_ref(), method, params).await
	}

	pub async fn call_batch(
		&self,
		calls: Vec<RpcCall>,
	) -> Result<Vec<(RpcCall, RpcOutcome)>, IndexerError> {
		call_batch(self.primary.as_ref(), calls, self.limit).await
	}

	pub async fn request_batch<R: DeserializeOwned>(
		&self,
		calls: Vec<RpcCall>,
	) -> Result<Vec<R>, IndexerError> {
		request_batch(self.primary.as_ref(), calls, self.limit).await
	}

	pub async fn rest<R: DeserializeOwned>(&self, request: &RestRequest) -> Result<R, IndexerError> {
		rest_single(self.primary.as_ref(), request).await
	}

	pub async fn rest_batch<R: DeserializeOwned>(
		&self,
		requests: Vec<RestRequest>,
	) -> Result<Vec<R>, IndexerError> {
		rest_batch(self.primary.as_ref(), requests, self.limit).await
	}
}
