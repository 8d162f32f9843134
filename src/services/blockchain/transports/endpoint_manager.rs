//! Active node URL and its fallbacks.
//!
//! Every request goes to the active URL. A rate limit or a connection failure moves the
//! manager to the next fallback that passes the transport's connection check, and the
//! request is sent again there. The URL that was left goes to the back of the fallbacks.

use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::services::blockchain::transports::{
	RestRequest, RotatingTransport, TransportError, ROTATE_ON_ERROR_CODES,
};

#[derive(Clone, Debug)]
pub struct EndpointManager {
	pub active_url: Arc<RwLock<String>>,
	pub fallback_urls: Arc<RwLock<Vec<String>>>,
	client: ClientWithMiddleware,
	/// Held for a whole rotation so concurrent failures rotate once
	rotation_lock: Arc<Mutex<()>>,
}

/// A JSON-RPC envelope posted to the URL, or a REST call below it
#[derive(Debug)]
enum Outbound<'a> {
	JsonRpc(String),
	Rest(&'a RestRequest),
}

/// What to do after one attempt on the active URL
enum Attempt {
	Done(Result<Value, TransportError>),
	Rotate(Failure),
}

/// Why the active URL is being abandoned
enum Failure {
	Status {
		status: StatusCode,
		url: String,
		body: String,
	},
	Unreachable(reqwest_middleware::Error),
}

impl Failure {
	fn into_error(self, rotation_error: TransportError) -> TransportError {
		match self {
			Self::Status { status, url, body } => {
				TransportError::http(status, url, body, Some(Box::new(rotation_error)), None)
			}
			Self::Unreachable(error) => {
				TransportError::network(error.to_string(), Some(Box::new(rotation_error)), None)
			}
		}
	}
}

impl EndpointManager {
	pub fn new(client: ClientWithMiddleware, active_url: &str, fallback_urls: Vec<String>) -> Self {
		Self {
			active_url: Arc::new(RwLock::new(active_url.to_string())),
			fallback_urls: Arc::new(RwLock::new(fallback_urls)),
			client,
			rotation_lock: Arc::new(Mutex::new(())),
		}
	}

	pub fn update_client(&mut self, client: ClientWithMiddleware) {
		self.client = client;
	}

	/// Makes the first fallback that accepts a connection the active URL and returns it.
	///
	/// Nothing changes when no fallback is left or the candidate fails to connect.
	pub async fn try_rotate_url<T: RotatingTransport>(
		&self,
		transport: &T,
	) -> Result<String, TransportError> {
		let _rotation = self.rotation_lock.lock().await;
		let previous = self.active_url.read().await.clone();
		let fallbacks = self.fallback_urls.read().await.clone();

		let Some(candidate) = fallbacks.iter().find(|url| **url != previous).cloned() else {
			return Err(TransportError::url_rotation(
				format!(
					"No fallback URLs available. Current active: '{}', Fallbacks checked: {:?}",
					previous, fallbacks
				),
				None,
				None,
			));
		};

		if let Err(e) = transport.try_connect(&candidate).await {
			return Err(TransportError::url_rotation(
				format!("Failed to connect to new URL '{}'", candidate),
				Some(e.into()),
				None,
			));
		}
		if let Err(e) = transport.update_client(&candidate).await {
			return Err(TransportError::url_rotation(
				format!("Failed to update transport client with new URL '{}'", candidate),
				Some(e.into()),
				None,
			));
		}

		let mut active = self.active_url.write().await;
		let mut remaining = self.fallback_urls.write().await;
		remaining.retain(|url| *url != candidate);
		remaining.push(previous.clone());
		*active = candidate.clone();

		tracing::debug!(from = %previous, to = %candidate, fallbacks = ?*remaining, "Rotated node URL");
		Ok(candidate)
	}

	/// Posts a JSON-RPC request, rotating on HTTP 429 and on connection failures. Any other
	/// non-2xx status fails at once.
	pub async fn send_raw_request<T, P>(
		&self,
		transport: &T,
		method: &str,
		params: Option<P>,
	) -> Result<Value, TransportError>
	where
		T: RotatingTransport,
		P: Into<Value> + Send + Clone + Serialize,
	{
		let envelope = transport.customize_request(method, params).await;
		let body = serde_json::to_string(&envelope).map_err(|e| {
			TransportError::request_serialization(
				"Failed to serialize request JSON",
				Some(Box::new(e)),
				None,
			)
		})?;
		self.send(transport, Outbound::JsonRpc(body)).await
	}

	/// Sends a REST request with the same rotation rules as [`Self::send_raw_request`]
	pub async fn send_rest_request<T: RotatingTransport>(
		&self,
		transport: &T,
		request: &RestRequest,
	) -> Result<Value, TransportError> {
		self.send(transport, Outbound::Rest(request)).await
	}

	async fn send<T: RotatingTransport>(
		&self,
		transport: &T,
		outbound: Outbound<'_>,
	) -> Result<Value, TransportError> {
		loop {
			let url = self.active_url.read().await.clone();
			let failure = match self.attempt(&url, &outbound).await {
				Attempt::Done(result) => return result,
				Attempt::Rotate(failure) => failure,
			};
			if let Err(rotation_error) = self.try_rotate_url(transport).await {
				return Err(failure.into_error(rotation_error));
			}
		}
	}

	async fn attempt(&self, url: &str, outbound: &Outbound<'_>) -> Attempt {
		let builder = match outbound {
			Outbound::JsonRpc(body) => self
				.client
				.post(url)
				.header("Content-Type", "application/json")
				.body(body.clone()),
			Outbound::Rest(request) => request.build(&self.client, url),
		};

		let response = match builder.send().await {
			Ok(response) => response,
			Err(e) => {
				tracing::warn!(url = %url, "Node unreachable: {}", e);
				return Attempt::Rotate(Failure::Unreachable(e));
			}
		};

		let status = response.status();
		if status.is_success() {
			return Attempt::Done(response.json().await.map_err(|e| {
				TransportError::response_parse(
					"Failed to parse JSON response",
					Some(Box::new(e)),
					None,
				)
			}));
		}
		if let Outbound::Rest(request) = outbound {
			if request.accepts(status.as_u16()) {
				tracing::debug!(path = %request.path, %status, "Status accepted as empty result");
				return Attempt::Done(Ok(Value::Null));
			}
		}

		let body = response.text().await.unwrap_or_default();
		tracing::warn!(url = %url, %status, "Node answered with an error: {}", body);
		if ROTATE_ON_ERROR_CODES.contains(&status.as_u16()) {
			return Attempt::Rotate(Failure::Status {
				status,
				url: url.to_string(),
				body,
			});
		}
		Attempt::Done(Err(TransportError::http(
			status,
			url.to_string(),
			body,
			None,
			None,
		)))
	}
}
