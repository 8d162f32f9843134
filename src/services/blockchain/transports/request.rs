//! REST request descriptors and connection checks.

use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use serde_json::{json, Value};

use crate::models::BlockChainType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestMethod {
	Get,
	Post,
}

/// A REST call relative to the active endpoint URL
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
	pub method: RestMethod,
	/// Path appended to the endpoint URL, starting with `/`
	pub path: String,
	pub query: Vec<(String, String)>,
	pub body: Option<Value>,
	/// Non-2xx statuses that mean "nothing here" rather than failure
	pub accepted_statuses: Vec<u16>,
}

impl RestRequest {
	pub fn get(path: impl Into<String>) -> Self {
		Self {
			method: RestMethod::Get,
			path: path.into(),
			query: Vec::new(),
			body: None,
			accepted_statuses: Vec::new(),
		}
	}

	pub fn post(path: impl Into<String>, body: Value) -> Self {
		Self {
			method: RestMethod::Post,
			body: Some(body),
			..Self::get(path)
		}
	}

	pub fn query(mut self, key: &str, value: impl ToString) -> Self {
		self.query.push((key.to_string(), value.to_string()));
		self
	}

	/// Treats `status` as an empty result
	pub fn accept(mut self, status: u16) -> Self {
		self.accepted_statuses.push(status);
		self
	}

	pub fn accepts(&self, status: u16) -> bool {
		self.accepted_statuses.contains(&status)
	}

	/// Absolute URL of this request against `base`
	pub fn url(&self, base: &str) -> String {
		format!("{}{}", base.trim_end_matches('/'), self.path)
	}

	pub(crate) fn build(&self, client: &ClientWithMiddleware, base: &str) -> RequestBuilder {
		let url = self.url(base);
		let builder = match self.method {
			RestMethod::Get => client.get(url),
			RestMethod::Post => client.post(url),
		};
		let builder = if self.query.is_empty() {
			builder
		} else {
			builder.query(&self.query)
		};
		match &self.body {
			Some(body) => builder.json(body),
			None => builder,
		}
	}
}

/// Cheap request used to check that a node answers before it becomes active
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionCheck {
	JsonRpc { method: String, params: Value },
	Rest(RestRequest),
}

impl ConnectionCheck {
	pub fn json_rpc(method: &str, params: Value) -> Self {
		Self::JsonRpc {
			method: method.to_string(),
			params,
		}
	}

	pub fn rest(path: &str) -> Self {
		Self::Rest(RestRequest::get(path))
	}

	pub fn for_chain(chain: BlockChainType) -> Self {
		match chain {
			BlockChainType::EVM => Self::json_rpc("net_version", json!([])),
			BlockChainType::UTXO => Self::json_rpc("getblockchaininfo", json!([])),
			BlockChainType::Solana => Self::json_rpc("getHealth", json!([])),
			BlockChainType::Filecoin => Self::json_rpc("Filecoin.Version", json!([])),
			BlockChainType::Ripple => Self::json_rpc("server_info", json!([{}])),
			BlockChainType::StarkNet => Self::json_rpc("starknet_chainId", json!([])),
			BlockChainType::Substrate => Self::rest("/node/version"),
			BlockChainType::Beacon => Self::rest("/eth/v1/node/version"),
			BlockChainType::Cosmos => Self::rest("/status"),
			BlockChainType::Stellar => Self::rest("/"),
			BlockChainType::TVM => Self::rest("/wallet/getnodeinfo"),
		}
	}

	pub(crate) fn build(&self, client: &ClientWithMiddleware, base: &str) -> RequestBuilder {
		match self {
			Self::JsonRpc { method, params } => client.post(base).json(&json!({
				"id": 1,
				"jsonrpc": "2.0",
				"method": method,
				"params": params
			})),
			Self::Rest(request) => request.build(client, base),
		}
	}
}
