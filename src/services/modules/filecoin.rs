//! `filecoin-main`: FIL movements read from a Lotus node.
//!
//! A height is a tipset of one or more blocks, or nothing at all for a null round. The
//! messages of tipset `n` execute in the context of its first non-null child, which is
//! where their receipts and the applicable base fee are published. A message's tip goes to
//! the miner of the first block in the tipset that included it.

use async_trait::async_trait;
use num_bigint::BigInt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::{debug, instrument};

use crate::{
	models::{
		address::THE_VOID,
		blockchain::filecoin::{
			FilecoinBlockMessages, FilecoinParentMessage, FilecoinReceipt, FilecoinTipSet,
		},
		BlockAux, BlockContext, BlockId, BlockOutput, ModuleConfig, ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{
			composite_identity, requester, verify_block_identity, BlockIdentity,
			BlockchainTransport, NodeSet, RpcCall,
		},
		currency::KnownCurrencies,
		indexer::{confirmed_height, IndexerError, IndexerModule},
		modules::{vocabulary, NoOptions},
		ordering::{renumber, Ledger},
	},
	utils::{decimal, time},
};

/// Longest run of null rounds searched for the child of a tipset
const MAX_NULL_ROUNDS: u64 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum FilecoinExtra {
	#[strum(serialize = "b")]
	BurntFee,
	#[strum(serialize = "f")]
	MinerTip,
}

impl FilecoinExtra {
	pub fn code(self) -> &'static str {
		self.into()
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChainHead {
	height: u64,
}

async fn tipset_at<T: BlockchainTransport>(node: &T, height: u64) -> Result<FilecoinTipSet, IndexerError> {
	requester::request_single(node, "Filecoin.ChainGetTipSetByHeight", json!([height, Value::Null])).await
}

async fn fetch_identity<T: BlockchainTransport>(
	node: Arc<T>,
	height: u64,
) -> Result<BlockIdentity, IndexerError> {
	let tipset = tipset_at(node.as_ref(), height).await?;
	// Lotus answers a null round with the tipset below it
	if tipset.height < height {
		return Ok(BlockIdentity::empty());
	}
	let first = tipset
		.blocks
		.first()
		.ok_or_else(|| IndexerError::malformed("Tipset has no blocks", "height", height))?;
	let cids = tipset.cid_strings();
	Ok(BlockIdentity::new(composite_identity(cids.as_slice()), time::from_unix_seconds(first.timestamp))
		.with_aux(BlockAux::Tipset {
			miners: tipset.blocks.iter().map(|block| block.miner.clone()).collect(),
			base_fee: first.parent_base_fee.clone(),
			cids,
		}))
}

pub struct FilecoinMainModule<T> {
	descriptor: ModuleDescriptor,
	nodes: Arc<NodeSet<T>>,
}

impl<T: BlockchainTransport + 'static> FilecoinMainModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let _: NoOptions = config.parse_options()?;
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::FilecoinMain)
				.with_extra_vocabulary(vocabulary::<FilecoinExtra>()),
			nodes,
		})
	}

	/// First non-null tipset above `height`
	async fn child_tipset(&self, height: u64) -> Result<FilecoinTipSet, IndexerError> {
		for next in height + 1..=height + MAX_NULL_ROUNDS {
			let tipset = tipset_at(self.nodes.primary.as_ref(), next).await?;
			if tipset.height == next {
				return Ok(tipset);
			}
			debug!(height = next, "Null round");
		}
		Err(IndexerError::requester_error(
			"Tipset has no child yet",
			None,
			Some(HashMap::from([("height".to_string(), height.to_string())])),
		))
	}

	/// Miner of the first block, in tipset order, that included each message
	async fn message_includers(
		&self,
		cids: &[String],
		miners: &[String],
	) -> Result<HashMap<String, String>, IndexerError> {
		let calls = cids
			.iter()
			.enumerate()
			.map(|(id, cid)| RpcCall::new(id, "Filecoin.ChainGetBlockMessages", json!([{"/": cid}])))
			.collect();
		let blocks: Vec<FilecoinBlockMessages> = self.nodes.request_batch(calls).await?;

		let mut includers = HashMap::new();
		for (block, miner) in blocks.iter().zip(miners) {
			for message in &block.cids {
				includers
					.entry(message.cid.clone())
					.or_insert_with(|| miner.clone());
			}
		}
		Ok(includers)
	}

	#[instrument(skip(self, context), fields(block = %context.block_id))]
	async fn process(&self, context: &BlockContext) -> Result<BlockOutput, IndexerError> {
		let height = confirmed_height(&self.descriptor, context.block_id)?;
		if context.is_empty() {
			return Ok(BlockOutput::events(Vec::new()));
		}
		let (cids, miners) = match &context.aux {
			BlockAux::Tipset { cids, miners, .. } => (cids.clone(), miners.clone()),
			_ => {
				let tipset = tipset_at(self.nodes.primary.as_ref(), height).await?;
				(tipset.cid_strings(), tipset.blocks.iter().map(|b| b.miner.clone()).collect())
			}
		};
		if miners.is_empty() || miners.len() != cids.len() {
			return Err(IndexerError::malformed("Tipset blocks do not match its cids", "height", height));
		}

		let child = self.child_tipset(height).await?;
		let child_block = child
			.blocks
			.first()
			.ok_or_else(|| IndexerError::malformed("Tipset has no blocks", "height", child.height))?;
		let parents: Vec<&str> = child_block.parents.iter().map(|cid| cid.cid.as_str()).collect();
		if parents != cids.iter().map(String::as_str).collect::<Vec<_>>() {
			return Err(IndexerError::consensus_error(
				"Child tipset does not descend from the verified tipset",
				None,
				Some(HashMap::from([
					("height".to_string(), height.to_string()),
					("child".to_string(), child.height.to_string()),
				])),
			));
		}

		let anchor = match child.cids.first() {
			Some(cid) => json!([{"/": cid.cid}]),
			None => return Err(IndexerError::malformed("Tipset has no cids", "height", child.height)),
		};
		let messages: Vec<FilecoinParentMessage> = self
			.nodes
			.request::<Option<Vec<FilecoinParentMessage>>>("Filecoin.ChainGetParentMessages", anchor.clone())
			.await?
			.unwrap_or_default();
		let receipts: Vec<FilecoinReceipt> = self
			.nodes
			.request::<Option<Vec<FilecoinReceipt>>>("Filecoin.ChainGetParentReceipts", anchor)
			.await?
			.unwrap_or_default();
		if messages.len() != receipts.len() {
			return Err(IndexerError::integrity_error(
				"Receipts do not match the executed messages",
				None,
				Some(HashMap::from([
					("height".to_string(), height.to_string()),
					("messages".to_string(), messages.len().to_string()),
					("receipts".to_string(), receipts.len().to_string()),
				])),
			));
		}

		let includers = self.message_includers(&cids, &miners).await?;

		let base_fee = decimal::parse_integer(&child_block.parent_base_fee)?;
		let mut ledger = Ledger::new(context);
		for (entry, receipt) in messages.iter().zip(&receipts) {
			let hash = entry.cid.cid.as_str();
			let message = &entry.message;

			let burnt = BigInt::from(receipt.gas_used) * &base_fee;
			ledger
				.transfer(Some(hash), &message.from, THE_VOID, &burnt)
				.extra(FilecoinExtra::BurntFee.code());

			let fee_cap = decimal::parse_integer(&message.gas_fee_cap)?;
			let premium = decimal::parse_integer(&message.gas_premium)?;
			let effective_premium = premium.min(fee_cap - &base_fee).max(BigInt::default());
			let tip = BigInt::from(message.gas_limit) * effective_premium;
			let miner = includers.get(hash).ok_or_else(|| {
				IndexerError::malformed("Executed message is in no block of the tipset", "message", hash)
			})?;
			ledger
				.transfer(Some(hash), &message.from, miner, &tip)
				.extra(FilecoinExtra::MinerTip.code());

			let value = decimal::parse_integer(&message.value)?;
			ledger
				.transfer(Some(hash), &message.from, &message.to, &value)
				.failed(receipt.exit_code != 0);
		}

		let mut events = ledger.into_events();
		renumber(&mut events);
		Ok(BlockOutput::events(events))
	}
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for FilecoinMainModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		let head: ChainHead = self.nodes.request("Filecoin.ChainHead", json!([])).await?;
		Ok(head.height)
	}

	async fn ensure_block(&self, block_id: BlockId) -> Result<BlockContext, IndexerError> {
		let height = confirmed_height(&self.descriptor, block_id)?;
		let identity = verify_block_identity(
			&self.nodes.consensus_nodes(),
			self.nodes.limit,
			move |node| fetch_identity(node, height),
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
		let balance: String = self.nodes.request("Filecoin.WalletBalance", json!([address])).await?;
		Ok(vec![decimal::parse_integer(&balance)?.to_string()])
	}
}
