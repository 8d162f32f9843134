use mockito::{Matcher, Server};
use serde_json::{json, Value};
use std::time::Duration;

use multichain_indexer::{
	models::{BlockChainType, Network},
	services::blockchain::{
		BlockchainTransport, ConnectionCheck, HttpTransportClient, RestRequest, RotatingTransport,
	},
	utils::{tests::NetworkBuilder, RetryConfig},
};

const NET_VERSION_CHECK: &str = r#"{"id":1,"jsonrpc":"2.0","method":"net_version","params":[]}"#;

fn evm_network(urls: Vec<&str>) -> Network {
	NetworkBuilder::new()
		.network_type(BlockChainType::EVM)
		.rpc_urls(urls)
		.build()
}

async fn net_version_mock(server: &mut mockito::ServerGuard) -> mockito::Mock {
	server
		.mock("POST", "/")
		.match_body(NET_VERSION_CHECK)
		.with_header("content-type", "application/json")
		.with_status(200)
		.with_body(r#"{"jsonrpc":"2.0","id":1,"result":"1"}"#)
		.create_async()
		.await
}

#[tokio::test]
async fn test_client_creation() {
	let mut server = Server::new_async().await;
	let mock = net_version_mock(&mut server).await;
	let network = evm_network(vec![&server.url()]);

	let transport = HttpTransportClient::new(&network, ConnectionCheck::for_chain(BlockChainType::EVM))
		.await
		.unwrap();
	assert_eq!(transport.get_current_url().await, server.url());
	mock.assert();

	let network = evm_network(vec!["invalid-url"]);
	let error = HttpTransportClient::new(&network, ConnectionCheck::for_chain(BlockChainType::EVM))
		.await
		.unwrap_err();
	assert!(error.to_string().contains("All RPC URLs failed to connect"));
}

#[tokio::test]
async fn test_client_creation_with_fallback() {
	let mut server = Server::new_async().await;
	let mut server2 = Server::new_async().await;

	// Transient failures are retried before the next endpoint is tried
	let expected_attempts = 1 + RetryConfig::default().max_retries;
	let failing = server
		.mock("POST", "/")
		.match_body(NET_VERSION_CHECK)
		.with_status(500)
		.expect(expected_attempts as usize)
		.create_async()
		.await;
	let healthy = net_version_mock(&mut server2).await;

	let network = evm_network(vec![&server.url(), &server2.url()]);
	let transport = HttpTransportClient::new(&network, ConnectionCheck::for_chain(BlockChainType::EVM))
		.await
		.unwrap();

	assert_eq!(transport.get_current_url().await, server2.url());
	failing.assert();
	healthy.assert();
}

#[tokio::test]
async fn test_rest_check_for_rest_chains() {
	let mut server = Server::new_async().await;
	let check = server
		.mock("GET", "/eth/v1/node/version")
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{"data": {"version": "Lighthouse/v5.1.0"}}"#)
		.create_async()
		.await;

	let network = NetworkBuilder::new()
		.network_type(BlockChainType::Beacon)
		.rpc_url(&server.url())
		.build();
	let transport =
		HttpTransportClient::new(&network, ConnectionCheck::for_chain(BlockChainType::Beacon))
			.await
			.unwrap();

	assert_eq!(transport.get_current_url().await, server.url());
	check.assert();
}

#[tokio::test]
async fn test_send_rest_request() {
	let mut server = Server::new_async().await;
	let ledger = server
		.mock("GET", "/ledgers/101")
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{"sequence": 101, "hash": "abc"}"#)
		.create_async()
		.await;
	let effects = server
		.mock("GET", "/ledgers/101/effects")
		.match_query(Matcher::AllOf(vec![
			Matcher::UrlEncoded("limit".into(), "200".into()),
			Matcher::UrlEncoded("cursor".into(), "42".into()),
		]))
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{"_embedded": {"records": []}}"#)
		.create_async()
		.await;

	let transport = HttpTransportClient::for_url(
		&server.url(),
		ConnectionCheck::rest("/"),
		Duration::from_secs(5),
	)
	.unwrap();

	let body = transport
		.send_rest_request(&RestRequest::get("/ledgers/101"))
		.await
		.unwrap();
	assert_eq!(body["sequence"], 101);

	let body = transport
		.send_rest_request(
			&RestRequest::get("/ledgers/101/effects")
				.query("limit", 200)
				.query("cursor", "42"),
		)
		.await
		.unwrap();
	assert_eq!(body["_embedded"]["records"], json!([]));

	ledger.assert();
	effects.assert();
}

#[tokio::test]
async fn test_send_raw_request() {
	let mut server = Server::new_async().await;
	let mock = server
		.mock("POST", "/")
		.match_body(Matcher::PartialJson(json!({
			"method": "getblockcount",
			"params": []
		})))
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{"jsonrpc":"2.0","id":1,"result":840000}"#)
		.create_async()
		.await;

	let transport = HttpTransportClient::for_url(
		&server.url(),
		ConnectionCheck::for_chain(BlockChainType::UTXO),
		Duration::from_secs(5),
	)
	.unwrap();

	let envelope = transport
		.send_raw_request("getblockcount", Some(json!([])))
		.await
		.unwrap();
	assert_eq!(envelope["result"], 840000);
	mock.assert();
}

#[tokio::test]
async fn test_client_update_client() {
	let server = Server::new_async().await;
	let server2 = Server::new_async().await;

	let client = HttpTransportClient::for_url(
		&server.url(),
		ConnectionCheck::for_chain(BlockChainType::EVM),
		Duration::from_secs(5),
	)
	.unwrap();

	client.update_client(&server2.url()).await.unwrap();
	assert_eq!(client.get_current_url().await, server2.url());

	let error = client.update_client("invalid-url").await.unwrap_err();
	assert!(error.to_string().contains("Invalid URL: invalid-url"));
	assert_eq!(client.get_current_url().await, server2.url());
}

#[tokio::test]
async fn test_try_connect_uses_check() {
	let mut healthy = Server::new_async().await;
	let mut broken = Server::new_async().await;

	let healthy_mock = net_version_mock(&mut healthy).await;
	let broken_mock = broken
		.mock("POST", "/")
		.with_status(403)
		.create_async()
		.await;

	let client = HttpTransportClient::for_url(
		&healthy.url(),
		ConnectionCheck::for_chain(BlockChainType::EVM),
		Duration::from_secs(5),
	)
	.unwrap();

	assert!(client.try_connect(&healthy.url()).await.is_ok());
	let error = client.try_connect(&broken.url()).await.unwrap_err();
	assert!(error.to_string().contains("403"));

	healthy_mock.assert();
	broken_mock.assert();
}

#[tokio::test]
async fn test_customize_request() {
	let client = HttpTransportClient::for_url(
		"http://localhost:8545",
		ConnectionCheck::for_chain(BlockChainType::EVM),
		Duration::from_secs(5),
	)
	.unwrap();

	let request = client
		.customize_request("eth_getBalance", Some(json!(["0xabc", "latest"])))
		.await;
	assert_eq!(
		request,
		json!({
			"jsonrpc": "2.0",
			"id": 1,
			"method": "eth_getBalance",
			"params": ["0xabc", "latest"]
		})
	);

	let request = client.customize_request("eth_blockNumber", None::<Value>).await;
	assert_eq!(request["params"], Value::Null);
}
