use serde_json::{json, Value};
use std::sync::Arc;

use multichain_indexer::{
	models::BlockId,
	services::{
		blockchain::{requester::request_single, verify_block_identity, BlockIdentity, TransportError},
		indexer::IndexerError,
	},
};

use crate::integration::mocks::{node_reporting, MockNodeTransport};

async fn fetch_identity(node: Arc<MockNodeTransport>) -> Result<BlockIdentity, IndexerError> {
	let block: Value = request_single(node.as_ref(), "getblock", json!([7])).await?;
	let hash = block["hash"].as_str().unwrap_or_default();
	Ok(BlockIdentity::new(hash, Some("2024-01-01 00:00:00".to_string())))
}

#[tokio::test]
async fn test_agreeing_nodes_return_reference_identity() {
	let nodes = vec![
		Arc::new(node_reporting("http://node-a", "0xabc")),
		Arc::new(node_reporting("http://node-b", "0xabc")),
		Arc::new(node_reporting("http://node-c", "0xabc")),
	];

	let identity = verify_block_identity(&nodes, 2, fetch_identity).await.unwrap();
	assert_eq!(identity.hash, "0xabc");

	let context = identity.into_context(BlockId::Height(7));
	assert_eq!(context.block_hash.as_deref(), Some("0xabc"));
	assert_eq!(context.time(), "2024-01-01 00:00:00");
}

#[tokio::test]
async fn test_disagreement_is_a_consensus_error() {
	let nodes = vec![
		Arc::new(node_reporting("http://node-a", "0xabc")),
		Arc::new(node_reporting("http://node-b", "0xabc")),
		Arc::new(node_reporting("http://node-c", "0xdef")),
	];

	let error = verify_block_identity(&nodes, 3, fetch_identity)
		.await
		.unwrap_err();

	assert!(matches!(error, IndexerError::ConsensusError(_)));
	assert!(!error.is_retryable());
	let context = error.context().unwrap();
	assert_eq!(context.metadata_value("node_a"), Some("http://node-a"));
	assert_eq!(context.metadata_value("hash_a"), Some("0xabc"));
	assert_eq!(context.metadata_value("node_b"), Some("http://node-c"));
	assert_eq!(context.metadata_value("hash_b"), Some("0xdef"));
}

#[tokio::test]
async fn test_first_node_is_the_reference() {
	// A majority never overrules the first node
	let nodes = vec![
		Arc::new(node_reporting("http://node-a", "0x111")),
		Arc::new(node_reporting("http://node-b", "0x222")),
		Arc::new(node_reporting("http://node-c", "0x222")),
	];

	let error = verify_block_identity(&nodes, 3, fetch_identity)
		.await
		.unwrap_err();
	let context = error.context().unwrap();
	assert_eq!(context.metadata_value("hash_a"), Some("0x111"));
	assert_eq!(context.metadata_value("node_b"), Some("http://node-b"));
}

#[tokio::test]
async fn test_unreachable_node_is_a_requester_error() {
	let mut unreachable = MockNodeTransport::new();
	unreachable
		.expect_get_current_url()
		.returning(|| "http://node-b".to_string());
	unreachable
		.expect_send_raw_request()
		.returning(|_, _| Err(TransportError::network("connection refused", None, None)));

	let nodes = vec![
		Arc::new(node_reporting("http://node-a", "0xabc")),
		Arc::new(unreachable),
	];

	let error = verify_block_identity(&nodes, 2, fetch_identity)
		.await
		.unwrap_err();
	assert!(matches!(error, IndexerError::RequesterError(_)));
	assert!(error.is_retryable());
}

#[tokio::test]
async fn test_single_node_is_trusted() {
	let nodes = vec![Arc::new(node_reporting("http://node-a", "0xabc"))];
	let identity = verify_block_identity(&nodes, 1, fetch_identity).await.unwrap();
	assert_eq!(identity.hash, "0xabc");
}

#[tokio::test]
async fn test_no_nodes_is_a_developer_error() {
	let nodes: Vec<Arc<MockNodeTransport>> = Vec::new();
	let error = verify_block_identity(&nodes, 1, fetch_identity)
		.await
		.unwrap_err();
	assert!(matches!(error, IndexerError::DeveloperError(_)));
}
