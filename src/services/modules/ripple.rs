//! `ripple-main`: XRP movements of the XRP Ledger.
//!
//! Transaction metadata lists the ledger entries each transaction touched. XRP balances
//! live on `AccountRoot` entries, so the balance differences of those entries are the
//! transaction's movements once the destroyed fee is accounted for.

use async_trait::async_trait;
use num_bigint::BigInt;
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::instrument;

use crate::{
	models::{
		address::THE_VOID,
		blockchain::ripple::{RippleAccountInfo, RippleLedgerResponse, RippleTransaction},
		BlockContext, BlockId, BlockOutput, Effect, ModuleConfig, ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{requester, verify_block_identity, BlockIdentity, BlockchainTransport, NodeSet},
		currency::KnownCurrencies,
		indexer::{confirmed_height, IndexerError, IndexerModule},
		modules::{vocabulary, NoOptions},
		ordering::{aggregate_by_address, renumber, Ledger},
	},
	utils::{decimal, time},
};

const ACCOUNT_NOT_FOUND: &str = "actNotFound";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum RippleExtra {
	#[strum(serialize = "f")]
	Fee,
}

impl RippleExtra {
	pub fn code(self) -> &'static str {
		self.into()
	}
}

#[derive(Debug, Deserialize)]
struct ValidatedLedger {
	ledger_index: u64,
}

async fn fetch_ledger<T: BlockchainTransport>(
	node: &T,
	index: u64,
	transactions: bool,
) -> Result<RippleLedgerResponse, IndexerError> {
	let params = json!([{"ledger_index": index, "transactions": transactions, "expand": transactions}]);
	let response: RippleLedgerResponse = requester::request_single(node, "ledger", params).await?;
	if !response.validated {
		return Err(IndexerError::requester_error(
			"Ledger is not validated yet",
			None,
			Some(HashMap::from([("ledger".to_string(), index.to_string())])),
		));
	}
	Ok(response)
}

async fn fetch_identity<T: BlockchainTransport>(
	node: Arc<T>,
	index: u64,
) -> Result<BlockIdentity, IndexerError> {
	let response = fetch_ledger(node.as_ref(), index, false).await?;
	let ledger = response.ledger;
	Ok(BlockIdentity::new(ledger.ledger_hash, time::from_ripple_seconds(ledger.close_time)))
}

pub struct RippleMainModule<T> {
	descriptor: ModuleDescriptor,
	nodes: Arc<NodeSet<T>>,
}

impl<T: BlockchainTransport + 'static> RippleMainModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let _: NoOptions = config.parse_options()?;
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::RippleMain)
				.with_extra_vocabulary(vocabulary::<RippleExtra>()),
			nodes,
		})
	}

	fn record_transaction(ledger: &mut Ledger, transaction: &RippleTransaction) -> Result<(), IndexerError> {
		let hash = transaction.hash.as_str();
		let fee = decimal::parse_integer(&transaction.fee)?;
		ledger
			.transfer(Some(hash), &transaction.account, THE_VOID, &fee)
			.extra(RippleExtra::Fee.code());

		let mut deltas = Vec::new();
		for node in &transaction.meta.affected_nodes {
			let Some((account, previous, current)) = node.account_root_change() else {
				continue;
			};
			let mut delta = decimal::parse_integer(current)? - decimal::parse_integer(previous)?;
			if account == transaction.account {
				delta += &fee;
			}
			deltas.push((account.to_string(), delta));
		}
		for (account, delta) in aggregate_by_address(deltas) {
			ledger
				.movement(Some(hash), &account, Effect::Amount(delta))
				.failed(!transaction.meta.is_success());
		}
		Ok(())
	}

	#[instrument(skip(self, context), fields(block = %context.block_id))]
	async fn process(&self, context: &BlockContext) -> Result<BlockOutput, IndexerError> {
		let index = confirmed_height(&self.descriptor, context.block_id)?;
		let response = fetch_ledger(self.nodes.primary.as_ref(), index, true).await?;
		let mut ledger_data = response.ledger;
		if let Some(verified) = context
			.block_hash
			.as_deref()
			.filter(|v| *v != ledger_data.ledger_hash)
		{
			return Err(IndexerError::consensus_error(
				"Ledger changed after its identity was verified",
				None,
				Some(HashMap::from([
					("ledger".to_string(), index.to_string()),
					("verified".to_string(), verified.to_string()),
					("fetched".to_string(), ledger_data.ledger_hash.clone()),
				])),
			));
		}

		ledger_data
			.transactions
			.sort_by_key(|transaction| transaction.meta.transaction_index);
		let mut ledger = Ledger::new(context);
		for transaction in &ledger_data.transactions {
			Self::record_transaction(&mut ledger, transaction)?;
		}

		let mut events = ledger.into_events();
		renumber(&mut events);
		Ok(BlockOutput::events(events))
	}
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for RippleMainModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		let validated: ValidatedLedger = self
			.nodes
			.request("ledger", json!([{"ledger_index": "validated"}]))
			.await?;
		Ok(validated.ledger_index)
	}

	async fn ensure_block(&self, block_id: BlockId) -> Result<BlockContext, IndexerError> {
		let index = confirmed_height(&self.descriptor, block_id)?;
		let identity = verify_block_identity(
			&self.nodes.consensus_nodes(),
			self.nodes.limit,
			move |node| fetch_identity(node, index),
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
		let info: RippleAccountInfo = self
			.nodes
			.request(
				"account_info",
				json!([{"account": address, "ledger_index": "validated"}]),
			)
			.await?;
		let balance = match (info.account_data, info.error) {
			(Some(data), _) => decimal::parse_integer(&data.balance)?,
			(None, Some(error)) if error == ACCOUNT_NOT_FOUND => BigInt::default(),
			(None, error) => {
				return Err(IndexerError::requester_error(
					"account_info failed",
					None,
					Some(HashMap::from([
						("account".to_string(), address.to_string()),
						("error".to_string(), error.unwrap_or_default()),
					])),
				))
			}
		};
		Ok(vec![balance.to_string()])
	}
}
