//! `cosmos-main`: bank-module coin movements of Cosmos SDK chains.
//!
//! Blocks and their execution results come from the CometBFT RPC; denomination metadata
//! and balances from the Cosmos REST API, which may live on a separate endpoint.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use num_bigint::BigInt;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{collections::HashMap, sync::Arc};
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::{debug, instrument};

use crate::{
	models::{
		blockchain::cosmos::{
			CometResponse, CosmosBalancesResponse, CosmosBlockResponse, CosmosBlockResults,
			CosmosDenomMetadataResponse, CosmosEvent, CosmosTxResult,
		},
		BlockContext, BlockId, BlockOutput, Currency, CurrencyFormat, Effect, ModuleConfig,
		ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{requester, verify_block_identity, BlockIdentity, BlockchainTransport, NodeSet, RestRequest},
		currency::{check_existing_currencies, KnownCurrencies},
		indexer::{confirmed_height, IndexerError, IndexerModule},
		modules::{vocabulary, NoOptions},
		ordering::{renumber, synthesize_mint_burn, Ledger},
	},
	utils::{decimal, time},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum CosmosExtra {
	#[strum(serialize = "f")]
	Fee,
}

impl CosmosExtra {
	pub fn code(self) -> &'static str {
		self.into()
	}
}

#[derive(Debug, Deserialize)]
struct CometStatus {
	sync_info: CometSyncInfo,
}

#[derive(Debug, Deserialize)]
struct CometSyncInfo {
	latest_block_height: String,
}

/// One coin of an `"<int><denom>"` list
fn parse_coins(value: &str) -> Result<Vec<(BigInt, String)>, IndexerError> {
	let mut coins = Vec::new();
	for coin in value.split(',').map(str::trim).filter(|coin| !coin.is_empty()) {
		let split = coin
			.find(|c: char| !c.is_ascii_digit())
			.ok_or_else(|| IndexerError::malformed("Coin has no denomination", "coin", coin))?;
		let (amount, denom) = coin.split_at(split);
		coins.push((decimal::parse_integer(amount)?, denom.to_string()));
	}
	Ok(coins)
}

/// Upper-case hex SHA-256 of the raw transaction bytes
fn transaction_hash(encoded: &str) -> Result<String, IndexerError> {
	let raw = STANDARD
		.decode(encoded)
		.map_err(|e| IndexerError::integrity_error("Transaction is not valid base64", Some(Box::new(e)), None))?;
	Ok(hex::encode_upper(Sha256::digest(raw)))
}

/// Tracks the fee deduction of one transaction: one debit of the payer, then one credit
/// of the fee collector, both for exactly the declared fee
struct FeeMatcher<'a> {
	fee: Option<&'a str>,
	payer: Option<&'a str>,
	spent: bool,
	received: bool,
}

impl<'a> FeeMatcher<'a> {
	fn new(events: &'a [CosmosEvent]) -> Self {
		let tx = events
			.iter()
			.find(|event| event.event_type == "tx" && event.attribute("fee").is_some());
		Self {
			fee: tx.and_then(|event| event.attribute("fee")).filter(|fee| !fee.is_empty()),
			payer: tx.and_then(|event| event.attribute("fee_payer")),
			spent: false,
			received: false,
		}
	}

	fn is_fee(&mut self, event: &CosmosEvent, address: &str, amount: &str) -> bool {
		let Some(fee) = self.fee else {
			return false;
		};
		if amount != fee {
			return false;
		}
		match event.event_type.as_str() {
			"coin_spent" if !self.spent && self.payer.is_none_or(|payer| payer == address) => {
				self.spent = true;
				true
			}
			"coin_received" if self.spent && !self.received => {
				self.received = true;
				true
			}
			_ => false,
		}
	}
}

pub struct CosmosMainModule<T> {
	descriptor: ModuleDescriptor,
	nodes: Arc<NodeSet<T>>,
}

impl<T: BlockchainTransport + 'static> CosmosMainModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let _: NoOptions = config.parse_options()?;
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::CosmosMain)
				.with_currency_format(CurrencyFormat::Denom)
				.with_extra_vocabulary(vocabulary::<CosmosExtra>()),
			nodes,
		})
	}

	fn record_events(
		ledger: &mut Ledger,
		transaction: Option<&str>,
		events: &mut [CosmosEvent],
		failed: bool,
	) -> Result<(), IndexerError> {
		for event in events.iter_mut() {
			event.decode_attributes();
		}
		let mut fees = FeeMatcher::new(events);

		for event in events.iter() {
			let (address, negative) = match event.event_type.as_str() {
				"coin_spent" => (event.attribute("spender"), true),
				"coin_received" => (event.attribute("receiver"), false),
				_ => continue,
			};
			let address = address.ok_or_else(|| {
				IndexerError::malformed("Coin event without an account", "type", &event.event_type)
			})?;
			let Some(amount) = event.attribute("amount") else {
				continue;
			};

			let is_fee = transaction.is_some() && fees.is_fee(event, address, amount);
			for (value, denom) in parse_coins(amount)? {
				let value = if negative { -value } else { value };
				let entries = ledger.movement(transaction, address, Effect::Amount(value)).currency(&denom);
				if is_fee {
					entries.extra(CosmosExtra::Fee.code());
				} else {
					entries.failed(failed);
				}
			}
		}
		Ok(())
	}

	async fn fetch_currencies(&self, denoms: &[String]) -> Result<Vec<Currency>, IndexerError> {
		let requests = denoms
			.iter()
			.map(|denom| {
				RestRequest::get(format!(
					"/cosmos/bank/v1beta1/denoms_metadata/{}",
					urlencoding::encode(denom)
				))
				.accept(404)
			})
			.collect();
		let metadata: Vec<Option<CosmosDenomMetadataResponse>> =
			requester::rest_batch(self.nodes.rest_transport(), requests, self.nodes.limit).await?;

		Ok(denoms
			.iter()
			.zip(metadata)
			.map(|(denom, metadata)| match metadata {
				Some(CosmosDenomMetadataResponse { metadata }) => {
					let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
					Currency::new(
						denom.clone(),
						non_empty(&metadata.name).or_else(|| Some(denom.clone())),
						non_empty(&metadata.symbol).or_else(|| Some(denom.clone())),
						Some(metadata.decimals()),
					)
				}
				None => Currency::new(denom.clone(), Some(denom.clone()), Some(denom.clone()), Some(0)),
			})
			.collect())
	}

	#[instrument(skip(self, context, known), fields(block = %context.block_id))]
	async fn process(
		&self,
		context: &BlockContext,
		known: &dyn KnownCurrencies,
	) -> Result<BlockOutput, IndexerError> {
		let height = confirmed_height(&self.descriptor, context.block_id)?;
		let block: CometResponse<CosmosBlockResponse> = self.nodes.rest(&block_request("/block", height)).await?;
		let results: CometResponse<CosmosBlockResults> =
			self.nodes.rest(&block_request("/block_results", height)).await?;
		let block = block.result;
		let mut results = results.result;

		if let Some(verified) = context.block_hash.as_deref().filter(|v| *v != block.block_id.hash) {
			return Err(IndexerError::consensus_error(
				"Block changed after its identity was verified",
				None,
				Some(HashMap::from([
					("block".to_string(), height.to_string()),
					("verified".to_string(), verified.to_string()),
					("fetched".to_string(), block.block_id.hash.clone()),
				])),
			));
		}

		let txs = block.block.data.txs.unwrap_or_default();
		let mut tx_results: Vec<CosmosTxResult> = results.txs_results.take().unwrap_or_default();
		if tx_results.len() != txs.len() {
			return Err(IndexerError::integrity_error(
				"Transaction results do not match the block's transactions",
				None,
				Some(HashMap::from([
					("block".to_string(), height.to_string()),
					("transactions".to_string(), txs.len().to_string()),
					("results".to_string(), tx_results.len().to_string()),
				])),
			));
		}

		let mut ledger = Ledger::new(context);
		let mut begin = results.begin_block_events.take().unwrap_or_default();
		Self::record_events(&mut ledger, None, &mut begin, false)?;
		for (encoded, result) in txs.iter().zip(tx_results.iter_mut()) {
			let hash = transaction_hash(encoded)?;
			let failed = result.is_failed();
			Self::record_events(&mut ledger, Some(hash.as_str()), &mut result.events, failed)?;
		}
		let mut end = results.end_block_events.take().unwrap_or_default();
		Self::record_events(&mut ledger, None, &mut end, false)?;
		let mut finalize = results.finalize_block_events.take().unwrap_or_default();
		Self::record_events(&mut ledger, None, &mut finalize, false)?;

		let mut events = synthesize_mint_burn(ledger.into_events());
		renumber(&mut events);

		let denoms: Vec<&str> = events.iter().filter_map(|event| event.currency.as_deref()).collect();
		let unknown = check_existing_currencies(denoms, CurrencyFormat::Denom, known, &self.descriptor.name);
		debug!(new_currencies = unknown.len(), "Collected denominations");
		let currencies = if unknown.is_empty() {
			Vec::new()
		} else {
			self.fetch_currencies(&unknown).await?
		};
		Ok(BlockOutput::with_currencies(events, currencies))
	}
}

fn block_request(path: &str, height: u64) -> RestRequest {
	RestRequest::get(path).query("height", height)
}

async fn fetch_identity<T: BlockchainTransport>(
	node: Arc<T>,
	height: u64,
) -> Result<BlockIdentity, IndexerError> {
	let response: CometResponse<CosmosBlockResponse> =
		requester::rest_single(node.as_ref(), &block_request("/block", height)).await?;
	let block = response.result;
	let time = time::from_rfc3339(&block.block.header.time).ok_or_else(|| {
		IndexerError::malformed("Invalid block time", "time", &block.block.header.time)
	})?;
	let count = block.block.data.txs.as_ref().map_or(0, Vec::len);
	Ok(BlockIdentity::new(block.block_id.hash, Some(time)).with_transaction_count(count))
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for CosmosMainModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		let status: CometResponse<CometStatus> = self.nodes.rest(&RestRequest::get("/status")).await?;
		let height = status.result.sync_info.latest_block_height;
		height
			.parse()
			.map_err(|_| IndexerError::malformed("Invalid latest height", "height", &height))
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
		known: &dyn KnownCurrencies,
	) -> Result<BlockOutput, IndexerError> {
		self.process(context, known).await
	}

	async fn api_get_balance(
		&self,
		address: &str,
		currencies: &[String],
	) -> Result<Vec<String>, IndexerError> {
		if currencies.is_empty() {
			return Err(IndexerError::developer_error(
				"Cosmos balances are requested per denomination",
				None,
				None,
			));
		}
		let request = RestRequest::get(format!("/cosmos/bank/v1beta1/balances/{}", address));
		let response: CosmosBalancesResponse =
			requester::rest_single(self.nodes.rest_transport(), &request).await?;
		let balances: HashMap<&str, &str> = response
			.balances
			.iter()
			.map(|coin| (coin.denom.as_str(), coin.amount.as_str()))
			.collect();
		currencies
			.iter()
			.map(|denom| match balances.get(denom.as_str()) {
				Some(amount) => Ok(decimal::parse_integer(amount)?.to_string()),
				None => Ok("0".to_string()),
			})
			.collect()
	}
}
