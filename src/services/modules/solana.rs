//! `solana-main` (lamports) and `solana-spl` (SPL tokens).
//!
//! Solana reports balances rather than transfers: every transaction carries the balances
//! of the accounts it touched before and after execution, and events are the differences.

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
		blockchain::solana::{SolanaBlock, SolanaTokenBalance, SolanaTransactionWithMeta},
		BlockContext, BlockId, BlockOutput, Currency, CurrencyFormat, Effect, ModuleConfig,
		ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{requester, verify_block_identity, BlockIdentity, BlockchainTransport, NodeSet, RpcOutcome},
		currency::{check_existing_currencies, KnownCurrencies},
		indexer::{confirmed_height, IndexerError, IndexerModule},
		modules::{vocabulary, NoOptions},
		ordering::{aggregate_by_address, renumber, synthesize_mint_burn, Ledger},
	},
	utils::{decimal, time},
};

/// Node answers for slots that hold no block
const SKIPPED_SLOT_CODES: [i64; 2] = [-32007, -32009];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum SolanaExtra {
	#[strum(serialize = "f")]
	Fee,
	#[strum(serialize = "r")]
	Reward,
}

impl SolanaExtra {
	pub fn code(self) -> &'static str {
		self.into()
	}
}

#[derive(Debug, Deserialize)]
struct ContextValue<V> {
	value: V,
}

#[derive(Debug, Deserialize)]
struct TokenAccount {
	account: TokenAccountData,
}

#[derive(Debug, Deserialize)]
struct TokenAccountData {
	data: Value,
}

impl TokenAccount {
	fn amount(&self) -> Option<&str> {
		self.account
			.data
			.pointer("/parsed/info/tokenAmount/amount")
			.and_then(Value::as_str)
	}
}

/// `getBlock` for `slot`, `None` when the slot was skipped
async fn fetch_block<T: BlockchainTransport>(
	node: &T,
	slot: u64,
	transaction_details: &str,
) -> Result<Option<SolanaBlock>, IndexerError> {
	let params = json!([slot, {
		"encoding": "json",
		"transactionDetails": transaction_details,
		"rewards": transaction_details == "full",
		"maxSupportedTransactionVersion": 0
	}]);
	match requester::call(node, "getBlock", params).await? {
		RpcOutcome::Error { code, message } if SKIPPED_SLOT_CODES.contains(&code) => {
			debug!(slot, code, message = message.as_str(), "Slot holds no block");
			Ok(None)
		}
		outcome => requester::decode("getBlock", outcome.into_result("getBlock")?),
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolanaBlockSummary {
	blockhash: String,
	#[serde(default)]
	block_time: Option<i64>,
	#[serde(default)]
	signatures: Vec<String>,
}

async fn fetch_identity<T: BlockchainTransport>(
	node: Arc<T>,
	slot: u64,
) -> Result<BlockIdentity, IndexerError> {
	let params = json!([slot, {
		"encoding": "json",
		"transactionDetails": "signatures",
		"rewards": false,
		"maxSupportedTransactionVersion": 0
	}]);
	let summary: SolanaBlockSummary = match requester::call(node.as_ref(), "getBlock", params).await? {
		RpcOutcome::Error { code, .. } if SKIPPED_SLOT_CODES.contains(&code) => {
			return Ok(BlockIdentity::empty())
		}
		outcome => requester::decode("getBlock", outcome.into_result("getBlock")?)?,
	};
	Ok(BlockIdentity::new(summary.blockhash, summary.block_time.and_then(time::from_unix_seconds))
		.with_transaction_count(summary.signatures.len()))
}

/// Block of a verified context; a non-empty context whose block is gone has been reorganized
async fn confirmed_block<T: BlockchainTransport>(
	nodes: &NodeSet<T>,
	context: &BlockContext,
	slot: u64,
) -> Result<Option<SolanaBlock>, IndexerError> {
	if context.is_empty() {
		return Ok(None);
	}
	let block = fetch_block(nodes.primary.as_ref(), slot, "full").await?;
	let fetched = block.as_ref().map(|block| block.blockhash.as_str()).unwrap_or_default();
	match context.block_hash.as_deref() {
		Some(verified) if verified != fetched => Err(IndexerError::consensus_error(
			"Block changed after its identity was verified",
			None,
			Some(HashMap::from([
				("slot".to_string(), slot.to_string()),
				("verified".to_string(), verified.to_string()),
				("fetched".to_string(), fetched.to_string()),
			])),
		)),
		_ => Ok(block),
	}
}

fn signature(transaction: &SolanaTransactionWithMeta) -> Result<&str, IndexerError> {
	transaction
		.signature()
		.ok_or_else(|| IndexerError::integrity_error("Transaction has no signature", None, None))
}

async fn inquire_slot<T: BlockchainTransport>(nodes: &NodeSet<T>) -> Result<u64, IndexerError> {
	nodes.request("getSlot", json!([{"commitment": "finalized"}])).await
}

async fn ensure_slot<T: BlockchainTransport + 'static>(
	nodes: &NodeSet<T>,
	descriptor: &ModuleDescriptor,
	block_id: BlockId,
) -> Result<BlockContext, IndexerError> {
	let slot = confirmed_height(descriptor, block_id)?;
	let identity = verify_block_identity(&nodes.consensus_nodes(), nodes.limit, move |node| {
		fetch_identity(node, slot)
	})
	.await?;
	Ok(identity.into_context(block_id))
}

pub struct SolanaMainModule<T> {
	descriptor: ModuleDescriptor,
	nodes: Arc<NodeSet<T>>,
}

impl<T: BlockchainTransport + 'static> SolanaMainModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let _: NoOptions = config.parse_options()?;
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::SolanaMain)
				.with_extra_vocabulary(vocabulary::<SolanaExtra>()),
			nodes,
		})
	}

	fn record_transaction(
		ledger: &mut Ledger,
		transaction: &SolanaTransactionWithMeta,
	) -> Result<(), IndexerError> {
		let hash = signature(transaction)?;
		let meta = transaction
			.meta
			.as_ref()
			.ok_or_else(|| IndexerError::malformed("Transaction has no status meta", "transaction", hash))?;
		let keys = transaction.account_keys();
		if keys.len() != meta.pre_balances.len() || keys.len() != meta.post_balances.len() {
			return Err(IndexerError::integrity_error(
				"Balance lists do not match the account keys",
				None,
				Some(HashMap::from([
					("transaction".to_string(), hash.to_string()),
					("keys".to_string(), keys.len().to_string()),
					("pre".to_string(), meta.pre_balances.len().to_string()),
					("post".to_string(), meta.post_balances.len().to_string()),
				])),
			));
		}
		let payer = keys
			.first()
			.ok_or_else(|| IndexerError::malformed("Transaction has no fee payer", "transaction", hash))?;
		let fee = BigInt::from(meta.fee);
		ledger
			.transfer(Some(hash), payer, THE_VOID, &fee)
			.extra(SolanaExtra::Fee.code());

		let deltas = keys.iter().enumerate().map(|(index, key)| {
			let mut delta = BigInt::from(meta.post_balances[index]) - BigInt::from(meta.pre_balances[index]);
			if index == 0 {
				delta += &fee;
			}
			(key.clone(), delta)
		});
		for (address, delta) in aggregate_by_address(deltas) {
			ledger
				.movement(Some(hash), &address, Effect::Amount(delta))
				.failed(transaction.is_failed());
		}
		Ok(())
	}

	#[instrument(skip(self, context), fields(block = %context.block_id))]
	async fn process(&self, context: &BlockContext) -> Result<BlockOutput, IndexerError> {
		let slot = confirmed_height(&self.descriptor, context.block_id)?;
		let Some(block) = confirmed_block(&self.nodes, context, slot).await? else {
			return Ok(BlockOutput::events(Vec::new()));
		};

		let mut ledger = Ledger::new(context);
		for transaction in &block.transactions {
			Self::record_transaction(&mut ledger, transaction)?;
		}
		for reward in &block.rewards {
			ledger
				.transfer(None, THE_VOID, &reward.pubkey, &BigInt::from(reward.lamports))
				.extra(SolanaExtra::Reward.code());
		}

		let mut events = ledger.into_events();
		renumber(&mut events);
		Ok(BlockOutput::events(events))
	}
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for SolanaMainModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		inquire_slot(&self.nodes).await
	}

	async fn ensure_block(&self, block_id: BlockId) -> Result<BlockContext, IndexerError> {
		ensure_slot(&self.nodes, &self.descriptor, block_id).await
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
		let balance: ContextValue<u64> = self.nodes.request("getBalance", json!([address])).await?;
		Ok(vec![balance.value.to_string()])
	}
}

pub struct SolanaSplModule<T> {
	descriptor: ModuleDescriptor,
	nodes: Arc<NodeSet<T>>,
}

impl<T: BlockchainTransport + 'static> SolanaSplModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let _: NoOptions = config.parse_options()?;
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::SolanaSpl)
				.with_currency_format(CurrencyFormat::SolanaMint),
			nodes,
		})
	}

	/// Token deltas per (owner, mint), in the order the pairs first appear
	fn record_transaction(
		ledger: &mut Ledger,
		transaction: &SolanaTransactionWithMeta,
		decimals: &mut HashMap<String, u32>,
	) -> Result<(), IndexerError> {
		let hash = signature(transaction)?;
		let Some(meta) = transaction.meta.as_ref() else {
			return Err(IndexerError::malformed("Transaction has no status meta", "transaction", hash));
		};
		let keys = transaction.account_keys();
		let owner = |balance: &SolanaTokenBalance| -> Result<String, IndexerError> {
			match &balance.owner {
				Some(owner) => Ok(owner.clone()),
				None => keys.get(balance.account_index).cloned().ok_or_else(|| {
					IndexerError::malformed("Token balance of an unknown account", "transaction", hash)
				}),
			}
		};

		let mut order: Vec<(String, String)> = Vec::new();
		let mut totals: HashMap<(String, String), BigInt> = HashMap::new();
		let pre = meta.pre_token_balances.as_deref().unwrap_or_default();
		let post = meta.post_token_balances.as_deref().unwrap_or_default();
		for (sign, balances) in [(-1, pre), (1, post)] {
			for balance in balances {
				let key = (owner(balance)?, balance.mint.clone());
				let amount = decimal::parse_integer(&balance.ui_token_amount.amount)? * sign;
				decimals.insert(balance.mint.clone(), balance.ui_token_amount.decimals);
				if !totals.contains_key(&key) {
					order.push(key.clone());
				}
				*totals.entry(key).or_default() += amount;
			}
		}

		for key in order {
			let delta = totals.remove(&key).unwrap_or_default();
			let (owner, mint) = key;
			ledger
				.movement(Some(hash), &owner, Effect::Amount(delta))
				.currency(&mint)
				.failed(transaction.is_failed());
		}
		Ok(())
	}

	#[instrument(skip(self, context, known), fields(block = %context.block_id))]
	async fn process(
		&self,
		context: &BlockContext,
		known: &dyn KnownCurrencies,
	) -> Result<BlockOutput, IndexerError> {
		let slot = confirmed_height(&self.descriptor, context.block_id)?;
		let Some(block) = confirmed_block(&self.nodes, context, slot).await? else {
			return Ok(BlockOutput::events(Vec::new()));
		};

		let mut ledger = Ledger::new(context);
		let mut decimals = HashMap::new();
		for transaction in &block.transactions {
			Self::record_transaction(&mut ledger, transaction, &mut decimals)?;
		}
		let mut events = synthesize_mint_burn(ledger.into_events());
		renumber(&mut events);

		let mints: Vec<&str> = events.iter().filter_map(|event| event.currency.as_deref()).collect();
		let currencies = check_existing_currencies(mints, CurrencyFormat::SolanaMint, known, &self.descriptor.name)
			.into_iter()
			.map(|mint| {
				let decimals = decimals.get(&mint).copied();
				Currency::new(mint, None, None, decimals)
			})
			.collect();
		Ok(BlockOutput::with_currencies(events, currencies))
	}
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for SolanaSplModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		inquire_slot(&self.nodes).await
	}

	async fn ensure_block(&self, block_id: BlockId) -> Result<BlockContext, IndexerError> {
		ensure_slot(&self.nodes, &self.descriptor, block_id).await
	}

	async fn process_block(
		&self,
		context: &BlockContext,
		known: &dyn KnownCurrencies,
	) -> Result<BlockOutput, IndexerError> {
		self.process(context, known).await
	}

	/// Sum over the owner's token accounts of each requested mint
	async fn api_get_balance(
		&self,
		address: &str,
		currencies: &[String],
	) -> Result<Vec<String>, IndexerError> {
		if currencies.is_empty() {
			return Err(IndexerError::developer_error(
				"SPL balances are requested per mint",
				None,
				None,
			));
		}
		let mut balances = Vec::with_capacity(currencies.len());
		for mint in currencies {
			let accounts: ContextValue<Vec<TokenAccount>> = self
				.nodes
				.request(
					"getTokenAccountsByOwner",
					json!([address, {"mint": mint}, {"encoding": "jsonParsed"}]),
				)
				.await?;
			let mut total = BigInt::default();
			for account in &accounts.value {
				let amount = account
					.amount()
					.ok_or_else(|| IndexerError::malformed("Token account without an amount", "mint", mint))?;
				total += decimal::parse_integer(amount)?;
			}
			balances.push(total.to_string());
		}
		Ok(balances)
	}
}
