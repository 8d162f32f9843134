//! `starknet-main`: movements of the StarkNet fee token.
//!
//! The fee token is an ERC-20 contract, so every balance change, fees included, is a
//! `Transfer` event. Events of a block are read through `starknet_getEvents`, which pages
//! its results with continuation tokens.

use async_trait::async_trait;
use num_bigint::BigInt;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::{collections::HashMap, sync::Arc};
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::{debug, instrument};

use crate::{
	models::{
		address::THE_VOID,
		blockchain::starknet::{
			normalize_felt, u256_from_halves, StarknetBlock, StarknetEmittedEvent,
			StarknetEventsPage,
		},
		BlockContext, BlockId, BlockOutput, ModuleConfig, ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{requester, verify_block_identity, BlockIdentity, BlockchainTransport, NodeSet},
		currency::KnownCurrencies,
		indexer::{confirmed_height, IndexerError, IndexerModule},
		modules::vocabulary,
		ordering::{renumber, Ledger},
	},
	utils::{
		pagination::{collect_all, Page},
		time,
	},
};

/// `sn_keccak("Transfer")`
const TRANSFER_SELECTOR: &str = "0x99cd8bde557814842a3121e8ddfd433a539b8c9f14bf31ebf108d12e6196e9";
/// `sn_keccak("balanceOf")`
const BALANCE_OF_SELECTOR: &str = "0x2e4263afad30923c891518314c3c95dbe830a16874e8abc5777a9a20b54c76e";
/// STRK on mainnet
const DEFAULT_FEE_TOKEN: &str = "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum StarknetExtra {
	#[strum(serialize = "f")]
	Fee,
}

impl StarknetExtra {
	pub fn code(self) -> &'static str {
		self.into()
	}
}

fn default_fee_token() -> String {
	DEFAULT_FEE_TOKEN.to_string()
}

fn default_chunk_size() -> usize {
	1000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct StarknetOptions {
	#[serde(default = "default_fee_token")]
	fee_token: String,
	/// Events per `starknet_getEvents` page
	#[serde(default = "default_chunk_size")]
	chunk_size: usize,
}

async fn fetch_block<T: BlockchainTransport>(node: &T, number: u64) -> Result<StarknetBlock, IndexerError> {
	let block: StarknetBlock = requester::request_single(
		node,
		"starknet_getBlockWithTxHashes",
		json!({"block_id": {"block_number": number}}),
	)
	.await?;
	if block.is_pending() {
		return Err(IndexerError::requester_error(
			"Block is still pending",
			None,
			Some(HashMap::from([("block".to_string(), number.to_string())])),
		));
	}
	Ok(block)
}

async fn fetch_identity<T: BlockchainTransport>(
	node: Arc<T>,
	number: u64,
) -> Result<BlockIdentity, IndexerError> {
	let block = fetch_block(node.as_ref(), number).await?;
	let count = block.transactions.len();
	let hash = block
		.block_hash
		.ok_or_else(|| IndexerError::malformed("Block has no hash", "block", number))?;
	Ok(BlockIdentity::new(normalize_felt(&hash)?, time::from_unix_seconds(block.timestamp))
		.with_transaction_count(count))
}

pub struct StarknetMainModule<T> {
	descriptor: ModuleDescriptor,
	fee_token: String,
	chunk_size: usize,
	nodes: Arc<NodeSet<T>>,
}

impl<T: BlockchainTransport + 'static> StarknetMainModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let options: StarknetOptions = config.parse_options()?;
		let fee_token = normalize_felt(&options.fee_token).map_err(|e| {
			IndexerError::developer_error(
				"fee_token is not a field element",
				Some(Box::new(e)),
				Some(HashMap::from([("fee_token".to_string(), options.fee_token.clone())])),
			)
		})?;
		if options.chunk_size == 0 {
			return Err(IndexerError::developer_error("chunk_size must be positive", None, None));
		}
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::StarknetMain)
				.with_extra_vocabulary(vocabulary::<StarknetExtra>()),
			fee_token,
			chunk_size: options.chunk_size,
			nodes,
		})
	}

	/// Every fee token `Transfer` of block `number`, in block order
	async fn transfer_events(&self, number: u64) -> Result<Vec<StarknetEmittedEvent>, IndexerError> {
		let nodes = &self.nodes;
		collect_all(|token: Option<String>| {
			let mut filter = Map::new();
			filter.insert("from_block".to_string(), json!({"block_number": number}));
			filter.insert("to_block".to_string(), json!({"block_number": number}));
			filter.insert("address".to_string(), json!(self.fee_token));
			filter.insert("keys".to_string(), json!([[TRANSFER_SELECTOR]]));
			filter.insert("chunk_size".to_string(), json!(self.chunk_size));
			if let Some(token) = token {
				filter.insert("continuation_token".to_string(), json!(token));
			}
			let params = json!({"filter": filter});
			async move {
				let page: StarknetEventsPage = nodes.request("starknet_getEvents", params).await?;
				debug!(events = page.events.len(), more = page.continuation_token.is_some(), "Events page");
				Ok::<_, IndexerError>(Page {
					records: page.events,
					next: page.continuation_token,
				})
			}
		})
		.await
	}

	fn party(felt: &str) -> Result<String, IndexerError> {
		let address = normalize_felt(felt)?;
		if address.trim_start_matches("0x").trim_start_matches('0').is_empty() {
			Ok(THE_VOID.to_string())
		} else {
			Ok(address)
		}
	}

	#[instrument(skip(self, context), fields(block = %context.block_id))]
	async fn process(&self, context: &BlockContext) -> Result<BlockOutput, IndexerError> {
		let number = confirmed_height(&self.descriptor, context.block_id)?;
		let block = fetch_block(self.nodes.primary.as_ref(), number).await?;
		let sequencer = normalize_felt(&block.sequencer_address)?;
		let events = self.transfer_events(number).await?;

		let mut ledger = Ledger::new(context);
		for event in &events {
			if let (Some(verified), Some(hash)) = (context.block_hash.as_deref(), event.block_hash.as_deref()) {
				if normalize_felt(hash)? != verified {
					return Err(IndexerError::consensus_error(
						"Event belongs to another block than the verified one",
						None,
						Some(HashMap::from([
							("block".to_string(), number.to_string()),
							("verified".to_string(), verified.to_string()),
							("fetched".to_string(), hash.to_string()),
						])),
					));
				}
			}
			if normalize_felt(&event.from_address)? != self.fee_token {
				continue;
			}
			let transfer = event.transfer().ok_or_else(|| {
				IndexerError::malformed(
					"Transfer event has an unexpected layout",
					"transaction",
					&event.transaction_hash,
				)
			})?;
			let amount = u256_from_halves(transfer.low, transfer.high)?;
			let from = Self::party(transfer.from)?;
			let to = Self::party(transfer.to)?;
			let hash = normalize_felt(&event.transaction_hash)?;
			let entries = ledger.transfer(Some(&hash), &from, &to, &amount);
			if to == sequencer {
				entries.extra(StarknetExtra::Fee.code());
			}
		}

		let mut events = ledger.into_events();
		renumber(&mut events);
		Ok(BlockOutput::events(events))
	}
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for StarknetMainModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		self.nodes.request("starknet_blockNumber", json!([])).await
	}

	async fn ensure_block(&self, block_id: BlockId) -> Result<BlockContext, IndexerError> {
		let number = confirmed_height(&self.descriptor, block_id)?;
		let identity = verify_block_identity(
			&self.nodes.consensus_nodes(),
			self.nodes.limit,
			move |node| fetch_identity(node, number),
		)
		.await?;
		Ok(identity.into_context(block_id))
	}

	async fn process_block(
		&self,
		context: &BlockContext,
		_known: &dyn KnownCurrencies,
	) -> Result<BlockOutput, IndexerError> {
		self.process(context).await
	}

	async fn api_get_balance(
		&self,
		address: &str,
		_currencies: &[String],
	) -> Result<Vec<String>, IndexerError> {
		let halves: Vec<String> = self
			.nodes
			.request(
				"starknet_call",
				json!({
					"request": {
						"contract_address": self.fee_token,
						"entry_point_selector": BALANCE_OF_SELECTOR,
						"calldata": [address]
					},
					"block_id": "latest"
				}),
			)
			.await?;
		let balance = match halves.as_slice() {
			[low, high] => u256_from_halves(low, high)?,
			[low] => u256_from_halves(low, "0x0")?,
			_ => BigInt::from(0),
		};
		Ok(vec![balance.to_string()])
	}
}
