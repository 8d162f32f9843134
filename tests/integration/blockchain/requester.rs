use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde_json::{json, Value};
use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use multichain_indexer::services::{
	blockchain::{
		requester::{call_batch, request_batch, request_single, rest_batch},
		BlockchainTransport, NodeSet, RestRequest, RpcCall, RpcOutcome, TransportError,
	},
	indexer::IndexerError,
};

use crate::integration::mocks::{rpc_result, MockNodeTransport};

/// Answers `echo` calls with their first parameter, slower for lower values
///
/// Completion order is therefore the reverse of submission order.
#[derive(Default)]
struct SlowEchoTransport {
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
}

impl SlowEchoTransport {
	async fn answer(&self, key: u64) {
		let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(now, Ordering::SeqCst);
		tokio::time::sleep(Duration::from_millis(5 * (10 - key.min(10)))).await;
		self.in_flight.fetch_sub(1, Ordering::SeqCst);
	}
}

#[async_trait::async_trait]
impl BlockchainTransport for SlowEchoTransport {
	async fn get_current_url(&self) -> String {
		"http://slow.node".to_string()
	}

	async fn send_raw_request<P>(
		&self,
		_method: &str,
		params: Option<P>,
	) -> Result<Value, TransportError>
	where
		P: Into<Value> + Send + Clone + Serialize,
	{
		let value = params.map(Into::into).unwrap_or(Value::Null);
		let key = value[0].as_u64().unwrap_or_default();
		self.answer(key).await;
		Ok(rpc_result(json!(key)))
	}

	async fn send_rest_request(&self, request: &RestRequest) -> Result<Value, TransportError> {
		let key: u64 = request
			.path
			.trim_start_matches("/blocks/")
			.parse()
			.unwrap_or_default();
		self.answer(key).await;
		Ok(json!({"height": key}))
	}

	fn update_endpoint_manager_client(
		&mut self,
		_: ClientWithMiddleware,
	) -> Result<(), anyhow::Error> {
		Ok(())
	}
}

#[tokio::test]
async fn test_batch_results_follow_call_ids() {
	let transport = SlowEchoTransport::default();
	let calls: Vec<RpcCall> = (0..8)
		.map(|id| RpcCall::new(id, "echo", json!([id])))
		.collect();

	let outcomes = call_batch(&transport, calls, 8).await.unwrap();

	let ids: Vec<usize> = outcomes.iter().map(|(call, _)| call.id).collect();
	assert_eq!(ids, (0..8).collect::<Vec<_>>());
	for (call, outcome) in outcomes {
		assert_eq!(outcome, RpcOutcome::Result(json!(call.id)));
	}
}

#[tokio::test]
async fn test_batch_respects_concurrency_limit() {
	let transport = SlowEchoTransport::default();
	let calls: Vec<RpcCall> = (0..6)
		.map(|id| RpcCall::new(id, "echo", json!([id])))
		.collect();

	let values: Vec<u64> = request_batch(&transport, calls, 2).await.unwrap();

	assert_eq!(values, vec![0, 1, 2, 3, 4, 5]);
	assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_rest_batch_keeps_request_order() {
	let transport = SlowEchoTransport::default();
	let requests: Vec<RestRequest> = (1..=5)
		.map(|height| RestRequest::get(format!("/blocks/{}", height)))
		.collect();

	let bodies: Vec<Value> = rest_batch(&transport, requests, 5).await.unwrap();

	let heights: Vec<u64> = bodies
		.iter()
		.map(|body| body["height"].as_u64().unwrap())
		.collect();
	assert_eq!(heights, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_request_single_passes_method_and_params() {
	let mut transport = MockNodeTransport::new();
	transport
		.expect_send_raw_request()
		.withf(|method, params| {
			method == "getblockhash" && params.as_ref() == Some(&json!([840000]))
		})
		.times(1)
		.returning(|_, _| Ok(rpc_result(json!("0000abcd"))));

	let hash: String = request_single(&transport, "getblockhash", json!([840000]))
		.await
		.unwrap();
	assert_eq!(hash, "0000abcd");
}

#[tokio::test]
async fn test_node_error_fails_the_batch() {
	let mut transport = MockNodeTransport::new();
	transport
		.expect_send_raw_request()
		.returning(|_, params| {
			if params == Some(json!([2])) {
				Ok(json!({
					"jsonrpc": "2.0",
					"id": 1,
					"error": {"code": -5, "message": "No such mempool transaction"}
				}))
			} else {
				Ok(rpc_result(json!({"txid": "aa"})))
			}
		});

	let calls: Vec<RpcCall> = (1..=3)
		.map(|id| RpcCall::new(id, "getrawtransaction", json!([id])))
		.collect();

	// The raw outcomes keep the node error for callers that tolerate it
	let outcomes = call_batch(&transport, calls.clone(), 2).await.unwrap();
	assert_eq!(
		outcomes[1].1,
		RpcOutcome::Error {
			code: -5,
			message: "No such mempool transaction".to_string()
		}
	);

	let error = request_batch::<_, Value>(&transport, calls, 2)
		.await
		.unwrap_err();
	assert!(error.is_retryable());
	let context = error.context().unwrap();
	assert_eq!(context.metadata_value("method"), Some("getrawtransaction"));
	assert_eq!(context.metadata_value("code"), Some("-5"));
}

#[tokio::test]
async fn test_transport_failure_is_a_requester_error() {
	let mut transport = MockNodeTransport::new();
	transport
		.expect_send_raw_request()
		.returning(|_, _| Err(TransportError::network("connection reset", None, None)));

	let error = request_single::<_, u64>(&transport, "getblockcount", json!([]))
		.await
		.unwrap_err();
	assert!(matches!(error, IndexerError::RequesterError(_)));
	assert!(error.is_retryable());
}

#[tokio::test]
async fn test_malformed_result_is_an_integrity_error() {
	let mut transport = MockNodeTransport::new();
	transport
		.expect_send_raw_request()
		.returning(|_, _| Ok(rpc_result(json!({"unexpected": true}))));

	let error = request_single::<_, u64>(&transport, "getblockcount", json!([]))
		.await
		.unwrap_err();
	assert!(matches!(error, IndexerError::IntegrityError(_)));
	assert!(!error.is_retryable());
}

#[tokio::test]
async fn test_node_set_routes_rest_calls() {
	let mut primary = MockNodeTransport::new();
	primary.expect_send_rest_request().never();
	primary
		.expect_send_raw_request()
		.returning(|_, _| Ok(rpc_result(json!("0x10"))));

	let mut rest = MockNodeTransport::new();
	rest.expect_send_rest_request()
		.withf(|request| request.path == "/cosmos/bank/v1beta1/denoms_metadata/uatom")
		.times(1)
		.returning(|_| Ok(json!({"metadata": {"symbol": "ATOM"}})));

	let node_set = NodeSet::single(primary, 4).with_rest(rest);

	let height: String = node_set.request("eth_blockNumber", json!([])).await.unwrap();
	assert_eq!(height, "0x10");

	let body: Value = multichain_indexer::services::blockchain::requester::rest_single(
		node_set.rest_transport(),
		&RestRequest::get("/cosmos/bank/v1beta1/denoms_metadata/uatom"),
	)
	.await
	.unwrap();
	assert_eq!(body["metadata"]["symbol"], "ATOM");
}
