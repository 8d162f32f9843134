//! `stellar-main`: lumen and issued-asset movements read from Horizon.
//!
//! Horizon reports balance changes as effects of operations. A ledger's transactions,
//! operations and effects are each walked through cursor pagination; effects are mapped
//! back to their transaction through the operation that caused them.

use async_trait::async_trait;
use num_bigint::BigInt;
use serde::{de::DeserializeOwned, Deserialize};
use std::{collections::HashMap, sync::Arc};
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::{debug, instrument};

use crate::{
	models::{
		address::THE_VOID,
		blockchain::stellar::{
			HorizonAccount, HorizonAsset, HorizonEffect, HorizonLedger, HorizonOperation, HorizonPage,
			HorizonRoot, HorizonTransaction, NATIVE_ASSET,
		},
		BlockContext, BlockId, BlockOutput, Currency, CurrencyFormat, Effect, ModuleConfig,
		ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{requester, verify_block_identity, BlockIdentity, BlockchainTransport, NodeSet, RestRequest},
		currency::{check_existing_currencies, KnownCurrencies},
		indexer::{confirmed_height, IndexerError, IndexerModule},
		modules::vocabulary,
		ordering::{renumber, synthesize_mint_burn, Ledger},
	},
	utils::{
		decimal,
		pagination::{collect_all, Page},
		time,
	},
};

/// Fractional digits of every Stellar amount
pub const STELLAR_DECIMALS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum StellarExtra {
	#[strum(serialize = "f")]
	Fee,
}

impl StellarExtra {
	pub fn code(self) -> &'static str {
		self.into()
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct StellarOptions {
	/// Records per Horizon page
	#[serde(default = "default_page_limit")]
	page_limit: usize,
}

fn default_page_limit() -> usize {
	200
}

/// Horizon records that can resume a collection walk
trait Paged {
	fn paging_token(&self) -> &str;
}

impl Paged for HorizonTransaction {
	fn paging_token(&self) -> &str {
		&self.paging_token
	}
}

impl Paged for HorizonOperation {
	fn paging_token(&self) -> &str {
		&self.paging_token
	}
}

impl Paged for HorizonEffect {
	fn paging_token(&self) -> &str {
		&self.paging_token
	}
}

fn asset_id(asset: &HorizonAsset, effect: &HorizonEffect) -> Option<String> {
	let id = asset.id();
	if id.is_none() {
		debug!(
			effect = effect.paging_token.as_str(),
			kind = effect.effect_type.as_str(),
			"Skipping effect on an asset without a currency id"
		);
	}
	id
}

fn amount(value: Option<&String>, effect: &HorizonEffect) -> Result<BigInt, IndexerError> {
	let value = value.ok_or_else(|| {
		IndexerError::malformed("Effect has no amount", "effect", &effect.paging_token)
	})?;
	Ok(decimal::scale_decimal(value, STELLAR_DECIMALS)?)
}

pub struct StellarMainModule<T> {
	descriptor: ModuleDescriptor,
	options: StellarOptions,
	nodes: Arc<NodeSet<T>>,
}

impl<T: BlockchainTransport + 'static> StellarMainModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let options: StellarOptions = config.parse_options()?;
		if options.page_limit == 0 {
			return Err(IndexerError::developer_error("page_limit must be positive", None, None));
		}
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::StellarMain)
				.with_currency_format(CurrencyFormat::StellarAsset)
				.with_extra_vocabulary(vocabulary::<StellarExtra>()),
			options,
			nodes,
		})
	}

	/// Every record of a ledger sub-collection
	async fn collect<R>(&self, path: String, include_failed: bool) -> Result<Vec<R>, IndexerError>
	where
		R: DeserializeOwned + Paged + Send,
	{
		let limit = self.options.page_limit;
		let nodes = &self.nodes;
		collect_all(|cursor: Option<String>| {
			let mut request = RestRequest::get(path.clone());
			if include_failed {
				request = request.query("include_failed", true);
			}
			request = request.query("limit", limit);
			if let Some(cursor) = cursor {
				request = request.query("cursor", cursor);
			}
			async move {
				let page: HorizonPage<R> = nodes.rest(&request).await?;
				let records = page.embedded.records;
				let next = if records.len() < limit {
					None
				} else {
					records.last().map(|record| record.paging_token().to_string())
				};
				Ok::<_, IndexerError>(Page { records, next })
			}
		})
		.await
	}

	fn record_effect(
		ledger: &mut Ledger,
		hash: &str,
		effect: &HorizonEffect,
		failed: bool,
	) -> Result<(), IndexerError> {
		let mut record = |address: &str, currency: String, value: BigInt| {
			ledger
				.movement(Some(hash), address, Effect::Amount(value))
				.currency(&currency)
				.failed(failed);
		};
		match effect.effect_type.as_str() {
			"account_credited" => {
				if let Some(currency) = asset_id(&effect.asset, effect) {
					record(&effect.account, currency, amount(effect.amount.as_ref(), effect)?);
				}
			}
			"account_debited" => {
				if let Some(currency) = asset_id(&effect.asset, effect) {
					record(&effect.account, currency, -amount(effect.amount.as_ref(), effect)?);
				}
			}
			"account_created" => {
				let value = amount(effect.starting_balance.as_ref(), effect)?;
				record(&effect.account, NATIVE_ASSET.to_string(), value);
			}
			// Each side of a trade gets its own effect, only the account's legs are recorded
			"trade" => {
				if let Some(currency) = asset_id(&effect.sold_asset(), effect) {
					record(&effect.account, currency, -amount(effect.sold_amount.as_ref(), effect)?);
				}
				if let Some(currency) = asset_id(&effect.bought_asset(), effect) {
					record(&effect.account, currency, amount(effect.bought_amount.as_ref(), effect)?);
				}
			}
			_ => {}
		}
		Ok(())
	}

	#[instrument(skip(self, context, known), fields(block = %context.block_id))]
	async fn process(
		&self,
		context: &BlockContext,
		known: &dyn KnownCurrencies,
	) -> Result<BlockOutput, IndexerError> {
		let sequence = confirmed_height(&self.descriptor, context.block_id)?;
		let header: HorizonLedger = self.nodes.rest(&ledger_request(sequence)).await?;
		if let Some(verified) = context.block_hash.as_deref().filter(|v| *v != header.hash) {
			return Err(IndexerError::consensus_error(
				"Ledger changed after its identity was verified",
				None,
				Some(HashMap::from([
					("ledger".to_string(), sequence.to_string()),
					("verified".to_string(), verified.to_string()),
					("fetched".to_string(), header.hash.clone()),
				])),
			));
		}

		let transactions: Vec<HorizonTransaction> = self
			.collect(format!("/ledgers/{}/transactions", sequence), true)
			.await?;
		let operations: Vec<HorizonOperation> = self
			.collect(format!("/ledgers/{}/operations", sequence), true)
			.await?;
		let effects: Vec<HorizonEffect> = self
			.collect(format!("/ledgers/{}/effects", sequence), false)
			.await?;

		let declared_operations: usize = transactions.iter().map(|tx| tx.operation_count).sum();
		let expected_operations = header.tx_set_operation_count.unwrap_or(declared_operations);
		if transactions.len() != header.transaction_count()
			|| operations.len() != expected_operations
			|| operations.len() != declared_operations
		{
			return Err(IndexerError::integrity_error(
				"Ledger collections do not match the ledger header",
				None,
				Some(HashMap::from([
					("ledger".to_string(), sequence.to_string()),
					("transactions".to_string(), transactions.len().to_string()),
					("expected_transactions".to_string(), header.transaction_count().to_string()),
					("operations".to_string(), operations.len().to_string()),
					("expected_operations".to_string(), expected_operations.to_string()),
				])),
			));
		}

		let operation_tx: HashMap<&str, &str> = operations
			.iter()
			.map(|operation| (operation.id.as_str(), operation.transaction_hash.as_str()))
			.collect();
		let mut effects_by_tx: HashMap<&str, Vec<&HorizonEffect>> = HashMap::new();
		for effect in &effects {
			let hash = operation_tx.get(effect.operation_id()).ok_or_else(|| {
				IndexerError::malformed(
					"Effect of an operation outside the ledger",
					"effect",
					&effect.paging_token,
				)
			})?;
			effects_by_tx.entry(hash).or_default().push(effect);
		}

		let mut ledger = Ledger::new(context);
		for transaction in &transactions {
			let hash = transaction.hash.as_str();
			let fee = decimal::parse_integer(&transaction.fee_charged)?;
			ledger
				.transfer(Some(hash), &transaction.fee_account, THE_VOID, &fee)
				.currency(NATIVE_ASSET)
				.extra(StellarExtra::Fee.code());
			for effect in effects_by_tx.remove(hash).unwrap_or_default() {
				Self::record_effect(&mut ledger, hash, effect, !transaction.successful)?;
			}
		}

		let mut events = synthesize_mint_burn(ledger.into_events());
		renumber(&mut events);

		let assets: Vec<&str> = events.iter().filter_map(|event| event.currency.as_deref()).collect();
		let currencies = check_existing_currencies(assets, CurrencyFormat::StellarAsset, known, &self.descriptor.name)
			.into_iter()
			.map(|id| {
				if id == NATIVE_ASSET {
					return Currency::new(
						id,
						Some("Stellar Lumens".to_string()),
						Some("XLM".to_string()),
						Some(STELLAR_DECIMALS),
					);
				}
				let code = id.split_once(':').map(|(code, _)| code.to_string());
				Currency::new(id, code.clone(), code, Some(STELLAR_DECIMALS))
			})
			.collect();
		Ok(BlockOutput::with_currencies(events, currencies))
	}
}

fn ledger_request(sequence: u64) -> RestRequest {
	RestRequest::get(format!("/ledgers/{}", sequence))
}

async fn fetch_identity<T: BlockchainTransport>(
	node: Arc<T>,
	sequence: u64,
) -> Result<BlockIdentity, IndexerError> {
	let header: HorizonLedger = requester::rest_single(node.as_ref(), &ledger_request(sequence)).await?;
	let time = time::from_rfc3339(&header.closed_at)
		.ok_or_else(|| IndexerError::malformed("Invalid ledger close time", "closed_at", &header.closed_at))?;
	let count = header.transaction_count();
	Ok(BlockIdentity::new(header.hash, Some(time)).with_transaction_count(count))
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for StellarMainModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		let root: HorizonRoot = self.nodes.rest(&RestRequest::get("/")).await?;
		Ok(root.history_latest_ledger)
	}

	async fn ensure_block(&self, block_id: BlockId) -> Result<BlockContext, IndexerError> {
		let sequence = confirmed_height(&self.descriptor, block_id)?;
		let identity = verify_block_identity(
			&self.nodes.consensus_nodes(),
			self.nodes.limit,
			move |node| fetch_identity(node, sequence),
		)
		.await?;
		Ok(identity.into_context(block_id))
	}

	async fn process_block(
		&self,
		context: &BlockContext,
		known: &dyn KnownCurrencies,
	) -> Result<BlockOutput, IndexerError> {
		self.process(context, known).await
	}

	/// Balances of the requested assets, lumens when none are named
	async fn api_get_balance(
		&self,
		address: &str,
		currencies: &[String],
	) -> Result<Vec<String>, IndexerError> {
		let request = RestRequest::get(format!("/accounts/{}", address)).accept(404);
		let account: Option<HorizonAccount> = self.nodes.rest(&request).await?;
		let balances: HashMap<String, &str> = account
			.as_ref()
			.map(|account| {
				account
					.balances
					.iter()
					.filter_map(|balance| Some((balance.asset.id()?, balance.balance.as_str())))
					.collect()
			})
			.unwrap_or_default();

		let native = [NATIVE_ASSET.to_string()];
		let requested = if currencies.is_empty() { &native[..] } else { currencies };
		requested
			.iter()
			.map(|id| -> Result<String, IndexerError> {
				match balances.get(id) {
					Some(balance) => Ok(decimal::scale_decimal(balance, STELLAR_DECIMALS)?.to_string()),
					None => Ok("0".to_string()),
				}
			})
			.collect()
	}
}
