use mockito::Server;
use std::sync::Arc;

use multichain_indexer::{
	models::BlockChainType,
	services::blockchain::{BlockchainTransport, ClientPool, ClientPoolTrait, REST_URL_TYPE},
	utils::tests::NetworkBuilder,
};

async fn healthy_evm_node(server: &mut mockito::ServerGuard) -> mockito::Mock {
	server
		.mock("POST", "/")
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{"jsonrpc":"2.0","id":1,"result":"1"}"#)
		.create_async()
		.await
}

#[tokio::test]
async fn test_node_set_is_created_and_cached() {
	let mut server = Server::new_async().await;
	let mock = healthy_evm_node(&mut server).await;

	let pool = ClientPool::new();
	let network = NetworkBuilder::new()
		.slug("ethereum")
		.rpc_url(&server.url())
		.build();

	assert_eq!(pool.get_client_count().await, 0);
	let first = pool.get_node_set(&network).await.unwrap();
	let second = pool.get_node_set(&network).await.unwrap();

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(pool.get_client_count().await, 1);
	assert_eq!(first.primary.get_current_url().await, server.url());
	assert_eq!(first.nodes.len(), 1);
	assert!(first.rest.is_none());

	mock.assert();
}

#[tokio::test]
async fn test_node_sets_are_kept_per_network() {
	let mut server = Server::new_async().await;
	let _mock = healthy_evm_node(&mut server).await;

	let pool = ClientPool::new();
	let mainnet = NetworkBuilder::new()
		.slug("ethereum")
		.rpc_url(&server.url())
		.build();
	let testnet = NetworkBuilder::new()
		.slug("sepolia")
		.name("Sepolia")
		.rpc_url(&server.url())
		.build();

	let a = pool.get_node_set(&mainnet).await.unwrap();
	let b = pool.get_node_set(&testnet).await.unwrap();
	assert!(!Arc::ptr_eq(&a, &b));
	assert_eq!(pool.get_client_count().await, 2);
}

#[tokio::test]
async fn test_consensus_nodes_follow_weights() {
	let mut primary = Server::new_async().await;
	let secondary = Server::new_async().await;
	let tertiary = Server::new_async().await;
	let _mock = healthy_evm_node(&mut primary).await;

	let network = NetworkBuilder::new()
		.clear_rpc_urls()
		.add_rpc_url(&tertiary.url(), "rpc", 10)
		.add_rpc_url(&primary.url(), "rpc", 100)
		.add_rpc_url(&secondary.url(), "rpc", 50)
		.consensus_nodes(2)
		.max_concurrency(3)
		.build();

	let node_set = ClientPool::new().get_node_set(&network).await.unwrap();

	assert_eq!(node_set.limit, 3);
	assert_eq!(node_set.nodes.len(), 2);
	assert_eq!(node_set.nodes[0].get_current_url().await, primary.url());
	assert_eq!(node_set.nodes[1].get_current_url().await, secondary.url());
	assert_eq!(node_set.primary.get_current_url().await, primary.url());
}

#[tokio::test]
async fn test_rest_endpoint_is_attached() {
	let mut rpc = Server::new_async().await;
	let rest = Server::new_async().await;
	let _mock = rpc
		.mock("GET", "/status")
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{"result": {"sync_info": {"latest_block_height": "100"}}}"#)
		.create_async()
		.await;

	let network = NetworkBuilder::new()
		.network_type(BlockChainType::Cosmos)
		.slug("cosmoshub")
		.rpc_url(&rpc.url())
		.add_rpc_url(&rest.url(), REST_URL_TYPE, 100)
		.build();

	let node_set = ClientPool::new().get_node_set(&network).await.unwrap();

	// REST endpoints never take part in identity verification
	assert_eq!(node_set.nodes.len(), 1);
	assert_eq!(node_set.rest_transport().get_current_url().await, rest.url());
	assert_eq!(node_set.primary.get_current_url().await, rpc.url());
}

#[tokio::test]
async fn test_unreachable_network_is_not_cached() {
	let pool = ClientPool::new();
	let network = NetworkBuilder::new()
		.rpc_url("http://127.0.0.1:1")
		.request_timeout_ms(500)
		.build();

	let error = pool.get_node_set(&network).await.unwrap_err();
	assert!(error.to_string().contains("Failed to connect to any node"));
	assert_eq!(pool.get_client_count().await, 0);
}
