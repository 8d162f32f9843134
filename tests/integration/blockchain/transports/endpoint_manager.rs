use mockito::{Matcher, Server};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

use multichain_indexer::services::blockchain::{
	BlockchainTransport, EndpointManager, RestRequest, TransportError,
};

use crate::integration::mocks::{AlwaysFailsToUpdateClientTransport, MockTransport};

fn get_mock_client_builder() -> ClientWithMiddleware {
	ClientBuilder::new(reqwest::Client::new()).build()
}

#[tokio::test]
async fn test_endpoint_rotation() {
	let server1 = Server::new_async().await;
	let mut server2 = Server::new_async().await;
	let server3 = Server::new_async().await;

	let mock2 = server2
		.mock("GET", "/")
		.with_status(200)
		.create_async()
		.await;

	let manager = EndpointManager::new(
		get_mock_client_builder(),
		server1.url().as_ref(),
		vec![server2.url(), server3.url()],
	);
	let transport = MockTransport::new();

	let new_url = manager.try_rotate_url(&transport).await.unwrap();
	assert_eq!(new_url, server2.url());
	assert_eq!(&*manager.active_url.read().await, &server2.url());
	// The previous active URL moves to the back of the fallbacks
	assert_eq!(
		&*manager.fallback_urls.read().await,
		&vec![server3.url(), server1.url()]
	);

	mock2.assert();
}

#[tokio::test]
async fn test_send_raw_request_returns_envelope() {
	let mut server = Server::new_async().await;

	let mock = server
		.mock("POST", "/")
		.match_body(Matcher::PartialJson(json!({
			"jsonrpc": "2.0",
			"method": "getblockhash",
			"params": [5]
		})))
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{"jsonrpc": "2.0", "result": "00ab", "id": 1}"#)
		.create_async()
		.await;

	let manager = EndpointManager::new(get_mock_client_builder(), server.url().as_ref(), vec![]);
	let transport = MockTransport::new();

	let result = manager
		.send_raw_request(&transport, "getblockhash", Some(json!([5])))
		.await
		.unwrap();

	assert_eq!(result["result"], "00ab");
	mock.assert();
}

#[tokio::test]
async fn test_rotation_on_rate_limit() {
	let mut primary_server = Server::new_async().await;
	let mut fallback_server = Server::new_async().await;

	let primary_mock = primary_server
		.mock("POST", "/")
		.with_status(429)
		.with_body("Rate limited")
		.expect(1)
		.create_async()
		.await;

	// Answers the connection check and the retried request
	let fallback_check = fallback_server
		.mock("GET", "/")
		.with_status(200)
		.create_async()
		.await;
	let fallback_mock = fallback_server
		.mock("POST", "/")
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{"jsonrpc": "2.0", "result": "success", "id": 1}"#)
		.create_async()
		.await;

	let manager = EndpointManager::new(
		get_mock_client_builder(),
		primary_server.url().as_ref(),
		vec![fallback_server.url()],
	);
	let transport = MockTransport::new();

	let result = manager
		.send_raw_request(&transport, "eth_blockNumber", None::<Value>)
		.await
		.unwrap();

	assert_eq!(result["result"], "success");
	primary_mock.assert();
	fallback_check.assert();
	fallback_mock.assert();
	assert_eq!(&*manager.active_url.read().await, &fallback_server.url());
}

#[tokio::test]
async fn test_rate_limit_without_fallback_is_http_error() {
	let mut server = Server::new_async().await;

	let mock = server
		.mock("POST", "/")
		.with_status(429)
		.with_body("Rate limited")
		.expect(1)
		.create_async()
		.await;

	let manager = EndpointManager::new(get_mock_client_builder(), server.url().as_ref(), vec![]);
	let transport = MockTransport::new();

	let result = manager
		.send_raw_request(&transport, "eth_blockNumber", None::<Value>)
		.await;

	match result.unwrap_err() {
		TransportError::Http {
			status_code,
			url,
			body,
			..
		} => {
			assert_eq!(status_code, 429);
			assert_eq!(url, server.url());
			assert_eq!(body, "Rate limited");
		}
		other => panic!("Expected Http error with status code 429, got {:?}", other),
	}
	mock.assert();
}

#[tokio::test]
async fn test_non_rotating_status_fails_immediately() {
	let mut server = Server::new_async().await;
	let mut fallback_server = Server::new_async().await;

	let mock = server
		.mock("POST", "/")
		.with_status(400)
		.with_body("Bad Request")
		.expect(1)
		.create_async()
		.await;
	let fallback_mock = fallback_server
		.mock("POST", "/")
		.expect(0)
		.create_async()
		.await;

	let manager = EndpointManager::new(
		get_mock_client_builder(),
		server.url().as_ref(),
		vec![fallback_server.url()],
	);
	let transport = MockTransport::new();

	let result = manager
		.send_raw_request(&transport, "eth_call", Some(json!([])))
		.await;

	assert!(matches!(
		result.unwrap_err(),
		TransportError::Http { status_code, .. } if status_code == 400
	));
	mock.assert();
	fallback_mock.assert();
	assert_eq!(&*manager.active_url.read().await, &server.url());
}

#[tokio::test]
async fn test_rotate_url_no_fallbacks() {
	let server = Server::new_async().await;
	let manager = EndpointManager::new(get_mock_client_builder(), server.url().as_ref(), vec![]);
	let transport = MockTransport::new();

	match manager.try_rotate_url(&transport).await.unwrap_err() {
		TransportError::UrlRotation(ctx) => {
			assert!(ctx.to_string().contains("No fallback URLs available"));
		}
		other => panic!("Expected UrlRotation error, got {:?}", other),
	}
	assert_eq!(&*manager.active_url.read().await, &server.url());
}

#[tokio::test]
async fn test_rotate_url_connection_failure() {
	let server = Server::new_async().await;
	let invalid_url = "http://127.0.0.1:1";

	let manager = EndpointManager::new(
		get_mock_client_builder(),
		server.url().as_ref(),
		vec![invalid_url.to_string()],
	);
	let transport = MockTransport::new();

	match manager.try_rotate_url(&transport).await.unwrap_err() {
		TransportError::UrlRotation(ctx) => {
			assert!(ctx.to_string().contains("Failed to connect to new URL"));
			assert!(ctx.to_string().contains(invalid_url));
		}
		other => panic!("Expected UrlRotation error, got {:?}", other),
	}

	// Nothing changes when the candidate is unreachable
	assert_eq!(&*manager.active_url.read().await, &server.url());
	assert_eq!(
		&*manager.fallback_urls.read().await,
		&vec![invalid_url.to_string()]
	);
}

#[tokio::test]
async fn test_rotate_url_update_client_failure() {
	let server1 = Server::new_async().await;
	let server2 = Server::new_async().await;

	let manager = EndpointManager::new(
		get_mock_client_builder(),
		server1.url().as_ref(),
		vec![server2.url()],
	);
	let transport = AlwaysFailsToUpdateClientTransport {
		current_url: Arc::new(RwLock::new(server1.url())),
	};

	match manager.try_rotate_url(&transport).await.unwrap_err() {
		TransportError::UrlRotation(ctx) => {
			assert!(ctx
				.to_string()
				.contains("Failed to update transport client with new URL"));
		}
		other => panic!("Expected UrlRotation error, got {:?}", other),
	}
	assert_eq!(&*manager.active_url.read().await, &server1.url());
	assert_eq!(transport.get_current_url().await, server1.url());
}

#[tokio::test]
async fn test_network_error_rotates_to_fallback() {
	let invalid_url = "http://127.0.0.1:1";
	let mut valid_server = Server::new_async().await;

	let check_mock = valid_server
		.mock("GET", "/")
		.with_status(200)
		.create_async()
		.await;
	let success_mock = valid_server
		.mock("POST", "/")
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{"jsonrpc": "2.0", "result": "success", "id": 1}"#)
		.create_async()
		.await;

	let manager = EndpointManager::new(
		get_mock_client_builder(),
		invalid_url,
		vec![valid_server.url()],
	);
	let transport = MockTransport::new();

	let response = manager
		.send_raw_request(&transport, "getblockcount", Some(json!([])))
		.await
		.unwrap();

	assert_eq!(response["result"], "success");
	check_mock.assert();
	success_mock.assert();
	assert_eq!(&*manager.active_url.read().await, &valid_server.url());
}

#[tokio::test]
async fn test_network_error_without_fallback() {
	let invalid_url = "http://127.0.0.1:1";
	let manager = EndpointManager::new(get_mock_client_builder(), invalid_url, vec![]);
	let transport = MockTransport::new();

	let result = manager
		.send_raw_request(&transport, "getblockcount", Some(json!([])))
		.await;

	assert!(matches!(result.unwrap_err(), TransportError::Network(_)));
	assert_eq!(&*manager.active_url.read().await, invalid_url);
}

#[tokio::test]
async fn test_response_parse_error() {
	let mut server = Server::new_async().await;

	let mock = server
		.mock("POST", "/")
		.with_status(200)
		.with_body("not json")
		.create_async()
		.await;

	let manager = EndpointManager::new(get_mock_client_builder(), server.url().as_ref(), vec![]);
	let transport = MockTransport::new();

	let result = manager
		.send_raw_request(&transport, "getblockcount", Some(json!([])))
		.await;

	assert!(matches!(
		result.unwrap_err(),
		TransportError::ResponseParse(_)
	));
	mock.assert();
}

#[tokio::test]
async fn test_rest_request_with_query() {
	let mut server = Server::new_async().await;

	let mock = server
		.mock("GET", "/blocks/42")
		.match_query(Matcher::UrlEncoded("finalized".into(), "true".into()))
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{"number": "42", "hash": "0x42"}"#)
		.create_async()
		.await;

	let manager = EndpointManager::new(get_mock_client_builder(), server.url().as_ref(), vec![]);
	let transport = MockTransport::new();

	let request = RestRequest::get("/blocks/42").query("finalized", true);
	let body = manager
		.send_rest_request(&transport, &request)
		.await
		.unwrap();

	assert_eq!(body, json!({"number": "42", "hash": "0x42"}));
	mock.assert();
}

#[tokio::test]
async fn test_rest_accepted_status_is_null() {
	let mut server = Server::new_async().await;

	let mock = server
		.mock("GET", "/accounts/GABC")
		.with_status(404)
		.with_body(r#"{"status": 404}"#)
		.expect(2)
		.create_async()
		.await;

	let manager = EndpointManager::new(get_mock_client_builder(), server.url().as_ref(), vec![]);
	let transport = MockTransport::new();

	let accepted = RestRequest::get("/accounts/GABC").accept(404);
	let body = manager
		.send_rest_request(&transport, &accepted)
		.await
		.unwrap();
	assert_eq!(body, Value::Null);

	let strict = RestRequest::get("/accounts/GABC");
	let result = manager.send_rest_request(&transport, &strict).await;
	assert!(matches!(
		result.unwrap_err(),
		TransportError::Http { status_code, .. } if status_code == 404
	));
	mock.assert();
}

#[tokio::test]
async fn test_rest_post_rotates_on_rate_limit() {
	let mut primary_server = Server::new_async().await;
	let mut fallback_server = Server::new_async().await;

	let primary_mock = primary_server
		.mock("POST", "/eth/v1/beacon/rewards/attestations/100")
		.with_status(429)
		.expect(1)
		.create_async()
		.await;
	let _check = fallback_server
		.mock("GET", "/")
		.with_status(200)
		.create_async()
		.await;
	let fallback_mock = fallback_server
		.mock("POST", "/eth/v1/beacon/rewards/attestations/100")
		.match_body(Matcher::Json(json!(["1", "2"])))
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{"data": {"total_rewards": []}}"#)
		.create_async()
		.await;

	let manager = EndpointManager::new(
		get_mock_client_builder(),
		primary_server.url().as_ref(),
		vec![fallback_server.url()],
	);
	let transport = MockTransport::new();

	let request = RestRequest::post("/eth/v1/beacon/rewards/attestations/100", json!(["1", "2"]));
	let body = manager
		.send_rest_request(&transport, &request)
		.await
		.unwrap();

	assert_eq!(body["data"]["total_rewards"], json!([]));
	primary_mock.assert();
	fallback_mock.assert();
}
