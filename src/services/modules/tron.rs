//! `tvm-main`: TRX movements of Tron, read from the full node HTTP API.
//!
//! A block lists its transactions and the contract each one runs; execution results
//! (burnt fees, internal calls, unstaked and claimed amounts) come from the block's
//! transaction infos. TRX frozen for resources leaves the liquid balance reported by
//! `getaccount`, so freezing and withdrawing are movements against `staking-pool`.

use async_trait::async_trait;
use num_bigint::BigInt;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::{debug, instrument};

use crate::{
	models::{
		address::{STAKING_POOL, THE_VOID},
		blockchain::tron::{
			tron_address, TronAccount, TronBlock, TronFreezeValue, TronOwnerValue,
			TronTransaction, TronTransactionInfo, TronTransferValue, TronTriggerValue,
		},
		BlockContext, BlockId, BlockOutput, ModuleConfig, ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{
			requester, verify_block_identity, BlockIdentity, BlockchainTransport, NodeSet,
			RestRequest,
		},
		currency::KnownCurrencies,
		indexer::{confirmed_height, IndexerError, IndexerModule},
		modules::vocabulary,
		ordering::{renumber, Ledger},
	},
	utils::time,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum TvmExtra {
	#[strum(serialize = "f")]
	Fee,
	#[strum(serialize = "i")]
	InternalCall,
	#[strum(serialize = "s")]
	Stake,
	#[strum(serialize = "u")]
	Unstake,
	#[strum(serialize = "r")]
	Reward,
}

impl TvmExtra {
	pub fn code(self) -> &'static str {
		self.into()
	}
}

/// Blocks behind the head before a block is irreversible
fn default_confirmations() -> u64 {
	19
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct TvmOptions {
	#[serde(default = "default_confirmations")]
	confirmations: u64,
}

fn block_request(number: u64) -> RestRequest {
	RestRequest::post("/wallet/getblockbynum", json!({"num": number, "visible": true}))
}

async fn fetch_block<T: BlockchainTransport>(node: &T, number: u64) -> Result<TronBlock, IndexerError> {
	let block: TronBlock = requester::rest_single(node, &block_request(number)).await?;
	if block.block_id.is_none() || block.block_header.is_none() {
		return Err(IndexerError::requester_error(
			"Block is not available yet",
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
	let time = block
		.block_header
		.as_ref()
		.and_then(|header| time::from_unix_millis(header.raw_data.timestamp));
	let count = block.transactions.len();
	let hash = block.block_id.unwrap_or_default();
	Ok(BlockIdentity::new(hash, time).with_transaction_count(count))
}

/// Typed parameter of the transaction's contract
fn contract_value<V: DeserializeOwned>(tx: &TronTransaction, value: &Value) -> Result<V, IndexerError> {
	serde_json::from_value(value.clone()).map_err(|e| {
		IndexerError::integrity_error(
			"Contract parameter is malformed",
			Some(Box::new(e)),
			Some(HashMap::from([("transaction".to_string(), tx.tx_id.clone())])),
		)
	})
}

pub struct TvmMainModule<T> {
	descriptor: ModuleDescriptor,
	confirmations: u64,
	nodes: Arc<NodeSet<T>>,
}

impl<T: BlockchainTransport + 'static> TvmMainModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let options: TvmOptions = config.parse_options()?;
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::TvmMain)
				.with_extra_vocabulary(vocabulary::<TvmExtra>()),
			confirmations: options.confirmations,
			nodes,
		})
	}

	/// Fee, then the contract's own movement, then internal calls
	fn record_transaction(
		ledger: &mut Ledger,
		tx: &TronTransaction,
		info: &TronTransactionInfo,
	) -> Result<(), IndexerError> {
		let hash = tx.tx_id.as_str();
		let Some(contract) = tx.contract() else {
			return Ok(());
		};
		let value = &contract.parameter.value;
		let owner: TronOwnerValue = contract_value(tx, value)?;
		let owner = tron_address(&owner.owner_address);
		let failed = !tx.is_success();

		ledger
			.transfer(Some(hash), &owner, THE_VOID, &BigInt::from(info.fee))
			.extra(TvmExtra::Fee.code());

		match contract.contract_type.as_str() {
			"TransferContract" => {
				let transfer: TronTransferValue = contract_value(tx, value)?;
				ledger
					.transfer(Some(hash), &owner, &tron_address(&transfer.to_address), &BigInt::from(transfer.amount))
					.failed(failed);
			}
			"TriggerSmartContract" => {
				let trigger: TronTriggerValue = contract_value(tx, value)?;
				ledger
					.transfer(
						Some(hash),
						&owner,
						&tron_address(&trigger.contract_address),
						&BigInt::from(trigger.call_value),
					)
					.failed(failed);
			}
			"FreezeBalanceV2Contract" => {
				let freeze: TronFreezeValue = contract_value(tx, value)?;
				ledger
					.transfer(Some(hash), &owner, STAKING_POOL, &BigInt::from(freeze.frozen_balance))
					.extra(TvmExtra::Stake.code())
					.failed(failed);
			}
			"WithdrawExpireUnfreezeContract" => {
				ledger
					.transfer(Some(hash), STAKING_POOL, &owner, &BigInt::from(info.withdraw_expire_amount))
					.extra(TvmExtra::Unstake.code());
			}
			"WithdrawBalanceContract" => {
				ledger
					.transfer(Some(hash), THE_VOID, &owner, &BigInt::from(info.withdraw_amount))
					.extra(TvmExtra::Reward.code());
			}
			other => debug!(transaction = hash, contract = other, "No TRX movement"),
		}

		if failed {
			return Ok(());
		}
		for internal in info.internal_transactions.iter().filter(|internal| !internal.rejected) {
			ledger
				.transfer(
					Some(hash),
					&tron_address(&internal.caller_address),
					&tron_address(&internal.transfer_to_address),
					&BigInt::from(internal.trx_value()),
				)
				.extra(TvmExtra::InternalCall.code());
		}
		Ok(())
	}

	async fn transaction_infos(&self, number: u64) -> Result<Vec<TronTransactionInfo>, IndexerError> {
		let request = RestRequest::post(
			"/wallet/gettransactioninfobyblocknum",
			json!({"num": number, "visible": true}),
		);
		// Blocks without transactions answer with an empty object
		match self.nodes.rest::<Value>(&request).await? {
			Value::Object(map) if map.is_empty() => Ok(Vec::new()),
			infos => requester::decode("gettransactioninfobyblocknum", infos),
		}
	}

	#[instrument(skip(self, context), fields(block = %context.block_id))]
	async fn process(&self, context: &BlockContext) -> Result<BlockOutput, IndexerError> {
		let number = confirmed_height(&self.descriptor, context.block_id)?;
		let block = fetch_block(self.nodes.primary.as_ref(), number).await?;
		let fetched = block.block_id.clone().unwrap_or_default();
		if let Some(verified) = context.block_hash.as_deref().filter(|v| *v != fetched) {
			return Err(IndexerError::consensus_error(
				"Block changed after its identity was verified",
				None,
				Some(HashMap::from([
					("block".to_string(), number.to_string()),
					("verified".to_string(), verified.to_string()),
					("fetched".to_string(), fetched),
				])),
			));
		}

		let infos = self.transaction_infos(number).await?;
		if infos.len() != block.transactions.len() {
			return Err(IndexerError::integrity_error(
				"Transaction infos do not match the block",
				None,
				Some(HashMap::from([
					("block".to_string(), number.to_string()),
					("transactions".to_string(), block.transactions.len().to_string()),
					("infos".to_string(), infos.len().to_string()),
				])),
			));
		}
		let infos: HashMap<&str, &TronTransactionInfo> =
			infos.iter().map(|info| (info.id.as_str(), info)).collect();

		let mut ledger = Ledger::new(context);
		for tx in &block.transactions {
			let info = infos.get(tx.tx_id.as_str()).ok_or_else(|| {
				IndexerError::malformed("Transaction has no info", "transaction", &tx.tx_id)
			})?;
			Self::record_transaction(&mut ledger, tx, info)?;
		}

		let mut events = ledger.into_events();
		renumber(&mut events);
		Ok(BlockOutput::events(events))
	}
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for TvmMainModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		let head: TronBlock = self
			.nodes
			.rest(&RestRequest::post("/wallet/getnowblock", json!({"visible": true})))
			.await?;
		let number = head
			.block_header
			.map(|header| header.raw_data.number)
			.ok_or_else(|| IndexerError::malformed("Head block has no header", "path", "/wallet/getnowblock"))?;
		Ok(number.saturating_sub(self.confirmations))
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
		let account: TronAccount = self
			.nodes
			.rest(&RestRequest::post(
				"/wallet/getaccount",
				json!({"address": address, "visible": true}),
			))
			.await?;
		Ok(vec![account.balance.to_string()])
	}
}
