use multichain_indexer::{
	models::{BlockId, Currency},
	services::{
		indexer::{processor::process_block, IndexerError},
		sink::MemorySink,
	},
};

use crate::integration::mocks::{ScriptedFailure, ScriptedModule};

const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

fn usdc() -> Currency {
	Currency::new(USDC, Some("USD Coin".into()), Some("USDC".into()), Some(6))
}

#[tokio::test]
async fn test_processed_block_is_emitted() {
	let module = ScriptedModule::new("eth-evm-main", 100);
	let sink = MemorySink::new();

	let output = process_block(&module, &sink, BlockId::Height(42)).await.unwrap();

	assert_eq!(output.events.len(), 2);
	let emitted = sink.emitted("eth-evm-main");
	assert_eq!(emitted.len(), 1);
	assert_eq!(emitted[0].0, BlockId::Height(42));
	assert_eq!(emitted[0].1, output.events);
	assert_eq!(module.processed(), vec![BlockId::Height(42)]);
}

#[tokio::test]
async fn test_mempool_is_processed_without_identity() {
	let module = ScriptedModule::new("btc-utxo-main", 100);
	let sink = MemorySink::new();

	let output = process_block(&module, &sink, BlockId::Mempool).await.unwrap();

	assert!(output.events.iter().all(|event| event.block == BlockId::Mempool));
	assert_eq!(sink.emitted("btc-utxo-main")[0].0, BlockId::Mempool);
}

#[tokio::test]
async fn test_currencies_are_emitted_once() {
	let module = ScriptedModule::new("eth-evm-erc-20", 100).with_token(usdc());
	let sink = MemorySink::new();

	let first = process_block(&module, &sink, BlockId::Height(1)).await.unwrap();
	assert_eq!(first.currencies, Some(vec![usdc()]));

	// The sink now knows the token, so the module skips its metadata
	let second = process_block(&module, &sink, BlockId::Height(2)).await.unwrap();
	assert_eq!(second.currencies, None);

	assert_eq!(sink.currencies("eth-evm-erc-20"), vec![usdc()]);
	assert_eq!(sink.currency_emissions(), 1);
	assert_eq!(sink.emitted("eth-evm-erc-20").len(), 2);
}

#[tokio::test]
async fn test_known_currencies_are_not_fetched() {
	let module = ScriptedModule::new("eth-evm-erc-20", 100).with_token(usdc());
	let sink = MemorySink::with_known_currencies("eth-evm-erc-20", &[USDC]);

	let output = process_block(&module, &sink, BlockId::Height(1)).await.unwrap();

	assert_eq!(output.currencies, None);
	assert_eq!(sink.currency_emissions(), 0);
}

#[tokio::test]
async fn test_unbalanced_block_is_never_emitted() {
	let module = ScriptedModule::new("eth-evm-main", 100).fail_at(5, ScriptedFailure::Unbalanced);
	let sink = MemorySink::new();

	let error = process_block(&module, &sink, BlockId::Height(5)).await.unwrap_err();

	assert!(matches!(error, IndexerError::IntegrityError(_)));
	assert!(sink.emitted("eth-evm-main").is_empty());
	assert_eq!(module.processed(), vec![BlockId::Height(5)]);
}

#[tokio::test]
async fn test_disagreeing_nodes_stop_before_fetching() {
	let module = ScriptedModule::new("eth-evm-main", 100).fail_at(5, ScriptedFailure::Disagreement);
	let sink = MemorySink::new();

	let error = process_block(&module, &sink, BlockId::Height(5)).await.unwrap_err();

	assert!(matches!(error, IndexerError::ConsensusError(_)));
	assert!(module.processed().is_empty());
	assert!(sink.emitted("eth-evm-main").is_empty());
}

#[tokio::test]
async fn test_module_errors_pass_through() {
	let module = ScriptedModule::new("eth-evm-main", 100)
		.fail_at(5, ScriptedFailure::Unreachable)
		.fail_at(6, ScriptedFailure::Malformed);
	let sink = MemorySink::new();

	let unreachable = process_block(&module, &sink, BlockId::Height(5)).await.unwrap_err();
	assert!(unreachable.is_retryable());

	let malformed = process_block(&module, &sink, BlockId::Height(6)).await.unwrap_err();
	assert!(matches!(malformed, IndexerError::IntegrityError(_)));
	assert_eq!(malformed.context().unwrap().metadata_value("block"), Some("6"));
}
