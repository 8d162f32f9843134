//! `evm-main`: native coin movements of an EVM block.

use async_trait::async_trait;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::instrument;

use super::{fetch_identity, latest_block, not_yet_available, quantity};
use crate::{
	models::{
		address::THE_VOID,
		blockchain::evm::{
			format_address, format_hash, u256_to_bigint, EVMBlock, EVMTransaction,
			EVMTransactionReceipt, EVMTxPoolContent, EVMUncle,
		},
		BlockContext, BlockId, BlockOutput, ModuleConfig, ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{verify_block_identity, BlockchainTransport, NodeSet, RpcCall},
		currency::KnownCurrencies,
		indexer::{confirmed_height, mempool_context, module_metadata, IndexerError, IndexerModule},
		modules::vocabulary,
		ordering::{renumber, renumber_per_transaction, Ledger},
	},
	utils::{decimal, time},
};

/// Movements that are not the plain value of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum EvmSpecialTransaction {
	#[strum(serialize = "f")]
	Fee,
	#[strum(serialize = "b")]
	BurntFee,
	#[strum(serialize = "r")]
	BlockReward,
	#[strum(serialize = "u")]
	UncleReward,
	#[strum(serialize = "w")]
	Withdrawal,
}

impl EvmSpecialTransaction {
	pub fn code(self) -> &'static str {
		self.into()
	}
}

const GWEI: u64 = 1_000_000_000;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EvmMainOptions {
	/// `[from_block, wei]` pairs; the last pair at or below a height applies
	#[serde(default)]
	block_reward: Vec<(u64, String)>,
	/// Nodes without `eth_getBlockReceipts`
	#[serde(default)]
	receipts_per_transaction: bool,
}

pub struct EvmMainModule<T> {
	descriptor: ModuleDescriptor,
	nodes: Arc<NodeSet<T>>,
	block_rewards: Vec<(u64, BigInt)>,
	receipts_per_transaction: bool,
}

impl<T: BlockchainTransport + 'static> EvmMainModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let options: EvmMainOptions = config.parse_options()?;
		let descriptor = ModuleDescriptor::new(name, ModuleKind::EvmMain)
			.with_extra_vocabulary(vocabulary::<EvmSpecialTransaction>())
			.with_mempool_support();

		let mut block_rewards = options
			.block_reward
			.iter()
			.map(|(from_block, wei)| {
				decimal::parse_integer(wei)
					.map(|reward| (*from_block, reward))
					.map_err(|e| {
						let mut metadata = module_metadata(&descriptor);
						metadata.insert("block_reward".to_string(), wei.clone());
						IndexerError::developer_error(
							"Invalid block reward",
							Some(Box::new(e)),
							Some(metadata),
						)
					})
			})
			.collect::<Result<Vec<_>, _>>()?;
		block_rewards.sort_by_key(|(from_block, _)| *from_block);

		Ok(Self {
			descriptor,
			nodes,
			block_rewards,
			receipts_per_transaction: options.receipts_per_transaction,
		})
	}

	fn block_reward(&self, height: u64) -> Option<&BigInt> {
		self.block_rewards
			.iter()
			.rev()
			.find(|(from_block, _)| *from_block <= height)
			.map(|(_, reward)| reward)
			.filter(|reward| !reward.is_zero())
	}

	#[instrument(skip(self, transactions), fields(count = transactions.len()))]
	async fn fetch_receipts(
		&self,
		height: u64,
		transactions: &[EVMTransaction],
	) -> Result<Vec<EVMTransactionReceipt>, IndexerError> {
		let mut receipts: Vec<EVMTransactionReceipt> = if self.receipts_per_transaction {
			let calls = transactions
				.iter()
				.enumerate()
				.map(|(id, tx)| {
					RpcCall::new(id, "eth_getTransactionReceipt", json!([format_hash(&tx.hash)]))
				})
				.collect();
			let receipts: Vec<Option<EVMTransactionReceipt>> =
				self.nodes.request_batch(calls).await?;
			receipts
				.into_iter()
				.collect::<Option<Vec<_>>>()
				.ok_or_else(|| not_yet_available(height))?
		} else {
			let receipts: Option<Vec<EVMTransactionReceipt>> = self
				.nodes
				.request("eth_getBlockReceipts", json!([quantity(height)]))
				.await?;
			receipts.ok_or_else(|| not_yet_available(height))?
		};
		receipts.sort_by_key(|receipt| receipt.transaction_index);
		Ok(receipts)
	}

	fn record_transaction(
		&self,
		ledger: &mut Ledger,
		tx: &EVMTransaction,
		receipt: &EVMTransactionReceipt,
		base_fee: Option<&BigInt>,
		miner: &str,
	) -> Result<(), IndexerError> {
		let hash = format_hash(&tx.hash);
		if receipt.transaction_hash != tx.hash {
			return Err(IndexerError::integrity_error(
				"Receipt does not belong to the transaction",
				None,
				Some(HashMap::from([
					("transaction".to_string(), hash),
					(
						"receipt".to_string(),
						format_hash(&receipt.transaction_hash),
					),
				])),
			));
		}

		let from = format_address(&tx.from);
		let gas_used = u256_to_bigint(&receipt.gas_used);
		let gas_price = receipt
			.effective_gas_price
			.or(tx.gas_price)
			.map(|price| u256_to_bigint(&price))
			.unwrap_or_default();
		let fee = &gas_used * &gas_price;

		match base_fee {
			Some(base_fee) => {
				let burnt = &gas_used * base_fee;
				let tip = &fee - &burnt;
				if tip.is_negative() {
					return Err(IndexerError::malformed(
						"Gas price below the base fee",
						"transaction",
						&hash,
					));
				}
				ledger
					.transfer(Some(&hash), &from, THE_VOID, &burnt)
					.extra(EvmSpecialTransaction::BurntFee.code());
				ledger
					.transfer(Some(&hash), &from, miner, &tip)
					.extra(EvmSpecialTransaction::Fee.code());
			}
			None => {
				ledger
					.transfer(Some(&hash), &from, miner, &fee)
					.extra(EvmSpecialTransaction::Fee.code());
			}
		}

		let value = u256_to_bigint(&tx.value);
		if !value.is_zero() {
			let to = tx
				.to
				.or(receipt.contract_address)
				.ok_or_else(|| IndexerError::malformed("Value sent to no recipient", "transaction", &hash))?;
			ledger
				.transfer(Some(&hash), &from, &format_address(&to), &value)
				.failed(receipt.is_failed());
		}
		Ok(())
	}

	/// Miner reward plus the inclusion bonus of every uncle, then the uncle rewards
	async fn record_rewards(
		&self,
		ledger: &mut Ledger,
		block: &EVMBlock,
		miner: &str,
	) -> Result<(), IndexerError> {
		let height = block.number();
		let Some(reward) = self.block_reward(height) else {
			return Ok(());
		};

		let uncles: Vec<EVMUncle> = if block.uncles.is_empty() {
			Vec::new()
		} else {
			let calls = (0..block.uncles.len())
				.map(|index| {
					RpcCall::new(
						index,
						"eth_getUncleByBlockNumberAndIndex",
						json!([quantity(height), quantity(index as u64)]),
					)
				})
				.collect();
			self.nodes.request_batch(calls).await?
		};

		let mut miner_reward = reward.clone();
		let mut uncle_rewards = Vec::with_capacity(uncles.len());
		for uncle in &uncles {
			let depth = height.saturating_sub(uncle.number());
			if depth == 0 || depth >= 8 {
				return Err(IndexerError::malformed(
					"Uncle is not within reward distance",
					"uncle",
					uncle.number(),
				));
			}
			miner_reward += reward / BigInt::from(32u32);
			uncle_rewards.push((
				format_address(&uncle.miner),
				reward * BigInt::from(8 - depth) / BigInt::from(8u32),
			));
		}

		ledger
			.transfer(None, THE_VOID, miner, &miner_reward)
			.extra(EvmSpecialTransaction::BlockReward.code());
		for (uncle_miner, uncle_reward) in uncle_rewards {
			ledger
				.transfer(None, THE_VOID, &uncle_miner, &uncle_reward)
				.extra(EvmSpecialTransaction::UncleReward.code());
		}
		Ok(())
	}

	#[instrument(skip(self, context), fields(block = %context.block_id))]
	async fn process_confirmed(&self, context: &BlockContext) -> Result<BlockOutput, IndexerError> {
		let height = confirmed_height(&self.descriptor, context.block_id)?;
		let block: Option<EVMBlock> = self
			.nodes
			.request("eth_getBlockByNumber", json!([quantity(height), true]))
			.await?;
		let block = block.ok_or_else(|| not_yet_available(height))?;

		let hash = format_hash(&block.hash);
		if let Some(verified) = context.block_hash.as_deref().filter(|v| *v != hash) {
			return Err(IndexerError::consensus_error(
				"Block changed after its identity was verified",
				None,
				Some(HashMap::from([
					("block".to_string(), height.to_string()),
					("verified".to_string(), verified.to_string()),
					("fetched".to_string(), hash),
				])),
			));
		}

		let receipts = self.fetch_receipts(height, &block.transactions).await?;
		if receipts.len() != block.transactions.len() {
			return Err(IndexerError::integrity_error(
				"Receipt count does not match transaction count",
				None,
				Some(HashMap::from([
					("block".to_string(), height.to_string()),
					(
						"transactions".to_string(),
						block.transactions.len().to_string(),
					),
					("receipts".to_string(), receipts.len().to_string()),
				])),
			));
		}

		let miner = format_address(&block.miner);
		let base_fee = block.base_fee_per_gas.as_ref().map(u256_to_bigint);
		let mut ledger = Ledger::new(context);
		for (tx, receipt) in block.transactions.iter().zip(&receipts) {
			self.record_transaction(&mut ledger, tx, receipt, base_fee.as_ref(), &miner)?;
		}

		self.record_rewards(&mut ledger, &block, &miner).await?;

		for withdrawal in block.withdrawals.iter().flatten() {
			let amount = BigInt::from(withdrawal.amount.to::<u64>()) * BigInt::from(GWEI);
			ledger
				.transfer(None, THE_VOID, &format_address(&withdrawal.address), &amount)
				.extra(EvmSpecialTransaction::Withdrawal.code());
		}

		let mut events = ledger.into_events();
		renumber(&mut events);
		Ok(BlockOutput::events(events))
	}

	#[instrument(skip(self))]
	async fn process_mempool(&self) -> Result<BlockOutput, IndexerError> {
		let content: EVMTxPoolContent = self.nodes.request("txpool_content", json!([])).await?;
		let mut ledger = Ledger::with_time(BlockId::Mempool, time::now());
		for tx in content.pending_transactions() {
			// Created contract addresses are only known once mined
			let Some(to) = tx.to else {
				continue;
			};
			ledger.transfer(
				Some(&format_hash(&tx.hash)),
				&format_address(&tx.from),
				&format_address(&to),
				&u256_to_bigint(&tx.value),
			);
		}

		let mut events = ledger.into_events();
		renumber_per_transaction(&mut events);
		Ok(BlockOutput::events(events))
	}
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for EvmMainModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		latest_block(self.nodes.primary.as_ref()).await
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

	async fn api_get_balance(
		&self,
		address: &str,
		currencies: &[String],
	) -> Result<Vec<String>, IndexerError> {
		if !currencies.is_empty() {
			return Err(IndexerError::developer_error(
				"evm-main only tracks the native coin",
				None,
				Some(module_metadata(&self.descriptor)),
			));
		}
		let balance: String = self
			.nodes
			.request("eth_getBalance", json!([address, "latest"]))
			.await?;
		Ok(vec![decimal::parse_hex(&balance)?.to_string()])
	}
}
