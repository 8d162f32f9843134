//! `utxo-main`: Bitcoin Core compatible chains.
//!
//! Every input spends a previous output, so a transaction debits the owners of the spent
//! outputs and credits the owners of its new outputs. What the inputs carry beyond the
//! outputs is the fee, collected by `the-void`; the coinbase mints its outputs from it.
//!
//! On chains with shielded pools the owners and amounts of shielded notes are hidden.
//! Spending notes debits `the-void` by an unknown amount and creating them credits it by
//! one; the fee is still exact, as the net value leaving the pools is public.

use async_trait::async_trait;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::Deserialize;
use serde_json::{json, Number};
use std::{collections::HashMap, sync::Arc};
use tracing::instrument;

use crate::{
	models::{
		address::{script_address, THE_VOID},
		blockchain::utxo::{
			UtxoBlock, UtxoBlockHeader, UtxoInput, UtxoScriptPubKey, UtxoTransaction,
		},
		BlockContext, BlockId, BlockOutput, Effect, ModuleConfig, ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{
			requester, verify_block_identity, BlockIdentity, BlockchainTransport, NodeSet, RpcCall,
			RpcOutcome,
		},
		currency::KnownCurrencies,
		indexer::{confirmed_height, mempool_context, IndexerError, IndexerModule},
		ordering::{renumber, renumber_per_transaction, Ledger},
	},
	utils::{decimal, time},
};

/// `RPC_INVALID_ADDRESS_OR_KEY`: the transaction left the mempool between two calls
const TRANSACTION_NOT_FOUND: i64 = -5;

fn default_decimals() -> u32 {
	8
}

fn default_verbosity() -> u8 {
	3
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UtxoOptions {
	#[serde(default = "default_decimals")]
	decimals: u32,
	/// `getblock` verbosity; 2 for nodes that inline spent values into inputs
	#[serde(default = "default_verbosity")]
	verbosity: u8,
}

pub struct UtxoMainModule<T> {
	descriptor: ModuleDescriptor,
	nodes: Arc<NodeSet<T>>,
	decimals: u32,
	verbosity: u8,
}

impl<T: BlockchainTransport + 'static> UtxoMainModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let options: UtxoOptions = config.parse_options()?;
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::UtxoMain).with_mempool_support(),
			nodes,
			decimals: options.decimals,
			verbosity: options.verbosity,
		})
	}

	fn amount(&self, value: &Number, transaction: &str) -> Result<BigInt, IndexerError> {
		decimal::scale_decimal(&value.to_string(), self.decimals).map_err(|e| {
			IndexerError::integrity_error(
				"Output value is not a valid coin amount",
				Some(Box::new(e)),
				Some(HashMap::from([
					("transaction".to_string(), transaction.to_string()),
					("value".to_string(), value.to_string()),
				])),
			)
		})
	}

	fn owner(script: &UtxoScriptPubKey) -> String {
		script
			.owner()
			.map(str::to_string)
			.unwrap_or_else(|| script_address(&script.hex))
	}

	/// Owner and value of the output an input spends
	fn spent<'a>(
		input: &'a UtxoInput,
		txid: &str,
		index: usize,
	) -> Result<(String, &'a Number), IndexerError> {
		match (&input.prevout, &input.value, &input.address) {
			(Some(prevout), _, _) => Ok((Self::owner(&prevout.script_pub_key), &prevout.value)),
			(None, Some(value), Some(address)) => Ok((address.clone(), value)),
			_ => Err(IndexerError::integrity_error(
				"Input without previous output",
				None,
				Some(HashMap::from([
					("transaction".to_string(), txid.to_string()),
					("input".to_string(), index.to_string()),
				])),
			)),
		}
	}

	/// Inputs, then outputs, then the fee
	fn record_transaction(
		&self,
		ledger: &mut Ledger,
		tx: &UtxoTransaction,
	) -> Result<(), IndexerError> {
		let txid = tx.txid.as_str();
		let mut outputs = BigInt::zero();
		let mut credits = Vec::with_capacity(tx.vout.len());
		for output in &tx.vout {
			let value = self.amount(&output.value, txid)?;
			outputs += &value;
			credits.push((Self::owner(&output.script_pub_key), value));
		}

		let fee = if tx.is_coinbase() {
			if outputs.is_zero() && !tx.creates_shielded() {
				return Err(IndexerError::malformed(
					"Coinbase creates no value",
					"transaction",
					txid,
				));
			}
			ledger.movement(Some(txid), THE_VOID, Effect::Amount(-&outputs));
			if tx.creates_shielded() {
				ledger.movement(Some(txid), THE_VOID, Effect::Unknown { negative: true });
			}
			None
		} else {
			let mut inputs = BigInt::zero();
			for (index, input) in tx.vin.iter().enumerate() {
				let (owner, value) = Self::spent(input, txid, index)?;
				let value = self.amount(value, txid)?;
				inputs += &value;
				ledger.movement(Some(txid), &owner, Effect::Amount(-value));
			}
			if tx.spends_shielded() {
				ledger.movement(Some(txid), THE_VOID, Effect::Unknown { negative: true });
			}
			let fee = inputs - &outputs + BigInt::from(tx.shielded_balance());
			if fee.is_negative() {
				return Err(IndexerError::malformed(
					"Transaction spends more than its inputs",
					"transaction",
					txid,
				));
			}
			Some(fee)
		};

		for (owner, value) in credits {
			ledger.movement(Some(txid), &owner, Effect::Amount(value));
		}
		if tx.creates_shielded() && !tx.is_coinbase() {
			ledger.movement(Some(txid), THE_VOID, Effect::Unknown { negative: false });
		}
		if let Some(fee) = fee {
			ledger.movement(Some(txid), THE_VOID, Effect::Amount(fee));
		}
		Ok(())
	}

	#[instrument(skip(self, context), fields(block = %context.block_id))]
	async fn process_confirmed(&self, context: &BlockContext) -> Result<BlockOutput, IndexerError> {
		let height = confirmed_height(&self.descriptor, context.block_id)?;
		let hash = match &context.block_hash {
			Some(hash) => hash.clone(),
			None => self.nodes.request("getblockhash", json!([height])).await?,
		};
		let block: UtxoBlock = self.nodes.request("getblock", json!([hash, self.verbosity])).await?;
		if block.hash != hash || block.height != height {
			return Err(IndexerError::consensus_error(
				"Block changed after its identity was verified",
				None,
				Some(HashMap::from([
					("block".to_string(), height.to_string()),
					("verified".to_string(), hash),
					("fetched".to_string(), block.hash),
				])),
			));
		}
		if block.n_tx != block.tx.len() {
			return Err(IndexerError::malformed(
				"Transaction count does not match the header",
				"block",
				height,
			));
		}

		let coinbases: Vec<usize> = block
			.tx
			.iter()
			.enumerate()
			.filter(|(_, tx)| tx.is_coinbase())
			.map(|(index, _)| index)
			.collect();
		if coinbases != [0] {
			return Err(IndexerError::integrity_error(
				"Block must start with its only coinbase",
				None,
				Some(HashMap::from([
					("block".to_string(), height.to_string()),
					("coinbases".to_string(), format!("{:?}", coinbases)),
				])),
			));
		}

		let mut ledger = Ledger::new(context);
		for tx in &block.tx {
			self.record_transaction(&mut ledger, tx)?;
		}
		let mut events = ledger.into_events();
		renumber(&mut events);
		Ok(BlockOutput::events(events))
	}

	#[instrument(skip(self))]
	async fn process_mempool(&self) -> Result<BlockOutput, IndexerError> {
		let txids: Vec<String> = self.nodes.request("getrawmempool", json!([])).await?;
		let calls = txids
			.iter()
			.enumerate()
			.map(|(id, txid)| RpcCall::new(id, "getrawtransaction", json!([txid, 2])))
			.collect();

		let mut ledger = Ledger::with_time(BlockId::Mempool, time::now());
		for (call, outcome) in self.nodes.call_batch(calls).await? {
			let result = match outcome {
				RpcOutcome::Error { code, .. } if code == TRANSACTION_NOT_FOUND => continue,
				outcome => outcome.into_result(&call.method)?,
			};
			let tx: UtxoTransaction =
				requester::decode(&call.method, result)?;
			self.record_transaction(&mut ledger, &tx)?;
		}

		let mut events = ledger.into_events();
		renumber_per_transaction(&mut events);
		Ok(BlockOutput::events(events))
	}
}

async fn fetch_identity<T: BlockchainTransport>(
	node: Arc<T>,
	height: u64,
) -> Result<BlockIdentity, IndexerError> {
	let node = node.as_ref();
	let hash: String = requester::request_single(node, "getblockhash", json!([height])).await?;
	let header: UtxoBlockHeader =
		requester::request_single(node, "getblockheader", json!([hash, true])).await?;
	Ok(BlockIdentity::new(header.hash, time::from_unix_seconds(header.time))
		.with_transaction_count(header.n_tx))
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for UtxoMainModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		self.nodes.request("getblockcount", json!([])).await
	}

	async fn ensure_block(&self, block_id: BlockId) -> Result<BlockContext, IndexerError> {
		let height = match block_id {
			BlockId::Mempool => return mempool_context(&self.descriptor),
			BlockId::Height(height) => height,
		};
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
		if context.block_id.is_mempool() {
			self.process_mempool().await
		} else {
			self.process_confirmed(context).await
		}
	}
}
