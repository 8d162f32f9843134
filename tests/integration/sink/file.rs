use tempfile::TempDir;

use multichain_indexer::{
	models::{BlockId, Currency, Event},
	services::{
		currency::KnownCurrencies,
		indexer::processor::process_block,
		sink::{FileSink, Sink},
	},
	utils::tests::EventBuilder,
};

use crate::integration::mocks::{ScriptedFailure, ScriptedModule};

const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

fn read_events(dir: &TempDir, file: &str) -> Vec<Event> {
	let content = std::fs::read_to_string(dir.path().join(file)).unwrap();
	serde_json::from_str(&content).unwrap()
}

#[tokio::test]
async fn test_open_creates_storage_directory() {
	let temp_dir = TempDir::new().unwrap();
	let storage = temp_dir.path().join("nested").join("data");

	let sink = FileSink::open(storage.clone()).await.unwrap();

	assert!(storage.is_dir());
	assert_eq!(sink.get_last_processed_block("m").await.unwrap(), None);
}

#[tokio::test]
async fn test_events_keep_ledger_order() {
	let temp_dir = TempDir::new().unwrap();
	let sink = FileSink::open(temp_dir.path().to_path_buf()).await.unwrap();

	let events = vec![
		EventBuilder::new()
			.block(BlockId::Height(7))
			.address("alice")
			.amount(-21)
			.extra("f")
			.sort_key(0)
			.build(),
		EventBuilder::new()
			.block(BlockId::Height(7))
			.address("the-void")
			.amount(21)
			.extra("f")
			.sort_key(1)
			.build(),
	];
	sink.emit_events("btc-utxo-main", BlockId::Height(7), &events)
		.await
		.unwrap();

	assert_eq!(read_events(&temp_dir, "btc-utxo-main_events_7.json"), events);

	// Amounts are written as decimal strings
	let raw = std::fs::read_to_string(temp_dir.path().join("btc-utxo-main_events_7.json")).unwrap();
	assert!(raw.contains(r#""effect":"-21""#));
}

#[tokio::test]
async fn test_watcher_progress_survives_reopen() {
	let temp_dir = TempDir::new().unwrap();
	{
		let sink = FileSink::open(temp_dir.path().to_path_buf()).await.unwrap();
		sink.save_last_processed_block("eth-evm-main", 19_000_000)
			.await
			.unwrap();
	}

	let reopened = FileSink::open(temp_dir.path().to_path_buf()).await.unwrap();
	assert_eq!(
		reopened.get_last_processed_block("eth-evm-main").await.unwrap(),
		Some(19_000_000)
	);
	assert_eq!(
		reopened.get_last_processed_block("eth-evm-erc-20").await.unwrap(),
		None
	);
}

#[tokio::test]
async fn test_processed_blocks_land_on_disk() {
	let temp_dir = TempDir::new().unwrap();
	let sink = FileSink::open(temp_dir.path().to_path_buf()).await.unwrap();
	let usdc = Currency::new(USDC, Some("USD Coin".into()), Some("USDC".into()), Some(6));
	let module = ScriptedModule::new("eth-evm-erc-20", 10)
		.with_token(usdc.clone())
		.fail_at(4, ScriptedFailure::Unbalanced);

	process_block(&module, &sink, BlockId::Height(3)).await.unwrap();
	assert!(process_block(&module, &sink, BlockId::Height(4)).await.is_err());

	let events = read_events(&temp_dir, "eth-evm-erc-20_events_3.json");
	assert_eq!(events.len(), 2);
	assert!(events.iter().all(|event| event.currency.as_deref() == Some(USDC)));
	assert!(!temp_dir.path().join("eth-evm-erc-20_events_4.json").exists());

	let reopened = FileSink::open(temp_dir.path().to_path_buf()).await.unwrap();
	assert!(reopened.is_known("eth-evm-erc-20", USDC));
	assert!(!reopened.is_known("eth-evm-main", USDC));
}

#[tokio::test]
async fn test_delete_events_only_touches_one_module() {
	let temp_dir = TempDir::new().unwrap();
	let sink = FileSink::open(temp_dir.path().to_path_buf()).await.unwrap();

	sink.emit_events("a", BlockId::Height(1), &[]).await.unwrap();
	sink.emit_events("a", BlockId::Height(2), &[]).await.unwrap();
	sink.emit_events("b", BlockId::Height(1), &[]).await.unwrap();
	sink.save_last_processed_block("a", 2).await.unwrap();

	sink.delete_events("a").await.unwrap();

	assert!(!temp_dir.path().join("a_events_1.json").exists());
	assert!(!temp_dir.path().join("a_events_2.json").exists());
	assert!(temp_dir.path().join("b_events_1.json").exists());
	assert_eq!(sink.get_last_processed_block("a").await.unwrap(), Some(2));
}
