//! `substrate-main`: Polkadot SDK chains read through Substrate API Sidecar.
//!
//! Sidecar attaches to every extrinsic the runtime events it caused. Which of those events
//! move balances depends on the pallet that was called, so the module first resolves the
//! pallets an extrinsic dispatches (looking through batches, multisig and proxy wrappers)
//! and only interprets the events those pallets are known to emit.

use async_trait::async_trait;
use num_bigint::BigInt;
use serde::Deserialize;
use serde_json::Value;
use std::{collections::HashSet, sync::Arc};
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::instrument;

use crate::{
	models::{
		address::{POOL, THE_VOID, TREASURY},
		blockchain::substrate::{
			SubstrateBalanceInfo, SubstrateBlock, SubstrateCall, SubstrateEvent, SubstrateMethod,
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
		modules::{vocabulary, NoOptions},
		ordering::{renumber, Ledger},
	},
	utils::{decimal, time},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum SubstrateExtra {
	#[strum(serialize = "f")]
	Fee,
	#[strum(serialize = "r")]
	StakingReward,
	#[strum(serialize = "s")]
	Slash,
	#[strum(serialize = "pb")]
	PoolBond,
	#[strum(serialize = "pw")]
	PoolWithdrawal,
	#[strum(serialize = "pp")]
	PoolPayout,
	#[strum(serialize = "bt")]
	Bounty,
}

impl SubstrateExtra {
	pub fn code(self) -> &'static str {
		self.into()
	}
}

/// Pallets with a dedicated handler; calls to any other pallet fall back to transfers
const HANDLED_PALLETS: [&str; 5] = [
	"balances",
	"staking",
	"nominationPools",
	"convictionVoting",
	"bounties",
];

const BATCH_METHODS: [&str; 3] = ["batch", "batchAll", "forceBatch"];

#[derive(Debug, Deserialize)]
struct BlockHead {
	number: String,
}

/// Pallets whose events are interpreted for one extrinsic, `None` for block hooks
struct Dispatch<'a> {
	pallets: Option<&'a HashSet<String>>,
}

impl Dispatch<'_> {
	fn handles(&self, pallet: &str) -> bool {
		self.pallets.is_none_or(|pallets| pallets.contains(pallet))
	}

	/// True only for an extrinsic that called `pallet`, never for block hooks
	fn calls(&self, pallet: &str) -> bool {
		self.pallets.is_some_and(|pallets| pallets.contains(pallet))
	}

	fn handles_transfers(&self) -> bool {
		self.pallets.is_none_or(|pallets| {
			pallets
				.iter()
				.any(|pallet| pallet == "balances" || !HANDLED_PALLETS.contains(&pallet.as_str()))
		})
	}
}

pub struct SubstrateMainModule<T> {
	descriptor: ModuleDescriptor,
	nodes: Arc<NodeSet<T>>,
}

impl<T: BlockchainTransport + 'static> SubstrateMainModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let _: NoOptions = config.parse_options()?;
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::SubstrateMain)
				.with_extra_vocabulary(vocabulary::<SubstrateExtra>()),
			nodes,
		})
	}

	fn record_event(
		ledger: &mut Ledger,
		transaction: Option<&str>,
		event: &SubstrateEvent,
		dispatch: &Dispatch<'_>,
	) -> Result<(), IndexerError> {
		let method = &event.method;
		let field = |index: usize| event_field(event, index);
		let amount = |index: usize| event_amount(event, index);

		match (method.pallet.as_str(), method.method.as_str()) {
			("balances", "Transfer") if dispatch.handles_transfers() => {
				ledger.transfer(transaction, &field(0)?, &field(1)?, &amount(2)?);
			}
			("transactionPayment", "TransactionFeePaid") if transaction.is_some() => {
				ledger
					.transfer(transaction, &field(0)?, THE_VOID, &amount(1)?)
					.extra(SubstrateExtra::Fee.code());
			}
			("staking", "Rewarded") if dispatch.handles("staking") => {
				// Older runtimes omit the reward destination, the amount is always last
				let last = event.data.len().saturating_sub(1);
				ledger
					.transfer(transaction, THE_VOID, &field(0)?, &amount(last)?)
					.extra(SubstrateExtra::StakingReward.code());
			}
			("staking", "Slashed") if dispatch.handles("staking") => {
				ledger
					.transfer(transaction, &field(0)?, THE_VOID, &amount(1)?)
					.extra(SubstrateExtra::Slash.code());
			}
			("nominationPools", "Bonded") if dispatch.handles("nominationPools") => {
				ledger
					.transfer(transaction, &field(0)?, POOL, &amount(2)?)
					.extra(SubstrateExtra::PoolBond.code());
			}
			("nominationPools", "Withdrawn") if dispatch.handles("nominationPools") => {
				ledger
					.transfer(transaction, POOL, &field(0)?, &amount(2)?)
					.extra(SubstrateExtra::PoolWithdrawal.code());
			}
			("nominationPools", "PaidOut") if dispatch.handles("nominationPools") => {
				ledger
					.transfer(transaction, POOL, &field(0)?, &amount(2)?)
					.extra(SubstrateExtra::PoolPayout.code());
			}
			("bounties", "BountyClaimed") if dispatch.handles("bounties") => {
				ledger
					.transfer(transaction, TREASURY, &field(2)?, &amount(1)?)
					.extra(SubstrateExtra::Bounty.code());
			}
			// A rejected bounty names no proposer; the slash of its bond does. Hooks also
			// emit balances.Slashed for staking slashes, which staking.Slashed already covers.
			("balances", "Slashed") if dispatch.calls("bounties") => {
				ledger
					.transfer(transaction, &field(0)?, TREASURY, &amount(1)?)
					.extra(SubstrateExtra::Bounty.code());
			}
			_ => {}
		}
		Ok(())
	}

	#[instrument(skip(self, context), fields(block = %context.block_id))]
	async fn process(&self, context: &BlockContext) -> Result<BlockOutput, IndexerError> {
		let height = confirmed_height(&self.descriptor, context.block_id)?;
		let block: SubstrateBlock = self.nodes.rest(&block_request(height)).await?;
		if let Some(verified) = context.block_hash.as_deref().filter(|v| *v != block.hash) {
			return Err(IndexerError::consensus_error(
				"Block changed after its identity was verified",
				None,
				Some(std::collections::HashMap::from([
					("block".to_string(), height.to_string()),
					("verified".to_string(), verified.to_string()),
					("fetched".to_string(), block.hash.clone()),
				])),
			));
		}

		let mut ledger = Ledger::new(context);
		if context.block_time.is_none() {
			ledger.set_time(block_time(&block)?);
		}

		let hooks = Dispatch { pallets: None };
		for event in &block.on_initialize.events {
			Self::record_event(&mut ledger, None, event, &hooks)?;
		}

		for (index, extrinsic) in block.extrinsics.iter().enumerate() {
			let hash = extrinsic.hash.clone().unwrap_or_else(|| format!("{}-{}", height, index));
			let mut pallets = HashSet::new();
			if extrinsic.success {
				dispatched_pallets(&extrinsic.method, &extrinsic.args, &mut pallets)?;
			}
			let dispatch = Dispatch {
				pallets: Some(&pallets),
			};
			for event in &extrinsic.events {
				Self::record_event(&mut ledger, Some(hash.as_str()), event, &dispatch)?;
			}
		}

		for event in &block.on_finalize.events {
			Self::record_event(&mut ledger, None, event, &hooks)?;
		}

		let mut events = ledger.into_events();
		renumber(&mut events);
		Ok(BlockOutput::events(events))
	}
}

fn block_request(height: u64) -> RestRequest {
	RestRequest::get(format!("/blocks/{}", height))
}

fn event_field(event: &SubstrateEvent, index: usize) -> Result<String, IndexerError> {
	event.field(index).ok_or_else(|| {
		IndexerError::malformed(
			"Event field is missing",
			"event",
			format!("{}.{}[{}]", event.method.pallet, event.method.method, index),
		)
	})
}

fn event_amount(event: &SubstrateEvent, index: usize) -> Result<BigInt, IndexerError> {
	Ok(decimal::parse_integer(&event_field(event, index)?)?)
}

/// Collects the pallets of the leaf calls under `method`
fn dispatched_pallets(
	method: &SubstrateMethod,
	args: &Value,
	pallets: &mut HashSet<String>,
) -> Result<(), IndexerError> {
	let nested: Vec<&Value> = match (method.pallet.as_str(), method.method.as_str()) {
		("utility", name) if BATCH_METHODS.contains(&name) => args
			.get("calls")
			.and_then(Value::as_array)
			.map(|calls| calls.iter().collect())
			.unwrap_or_default(),
		("multisig", "asMulti" | "asMultiThreshold1") | ("proxy", "proxy") => {
			args.get("call").into_iter().collect()
		}
		_ => {
			pallets.insert(method.pallet.clone());
			return Ok(());
		}
	};

	for value in nested {
		let call = SubstrateCall::deserialize(value).map_err(|e| {
			IndexerError::integrity_error(
				"Nested call is malformed",
				Some(Box::new(e)),
				Some(std::collections::HashMap::from([(
					"call".to_string(),
					format!("{}.{}", method.pallet, method.method),
				)])),
			)
		})?;
		dispatched_pallets(&call.method, &call.args, pallets)?;
	}
	Ok(())
}

/// Time set by the block's `timestamp.set` inherent
fn block_time(block: &SubstrateBlock) -> Result<String, IndexerError> {
	block
		.extrinsics
		.iter()
		.find(|extrinsic| extrinsic.method.is("timestamp", "set"))
		.and_then(|extrinsic| match extrinsic.args.get("now")? {
			Value::String(now) => now.parse::<i64>().ok(),
			Value::Number(now) => now.as_i64(),
			_ => None,
		})
		.and_then(time::from_unix_millis)
		.ok_or_else(|| IndexerError::malformed("Block has no timestamp", "block", &block.number))
}

async fn fetch_identity<T: BlockchainTransport>(
	node: Arc<T>,
	height: u64,
) -> Result<BlockIdentity, IndexerError> {
	let block: SubstrateBlock = requester::rest_single(node.as_ref(), &block_request(height)).await?;
	let time = block_time(&block)?;
	Ok(BlockIdentity::new(block.hash, Some(time)).with_transaction_count(block.extrinsics.len()))
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for SubstrateMainModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		let head: BlockHead = self.nodes.rest(&RestRequest::get("/blocks/head")).await?;
		head.number
			.parse()
			.map_err(|_| IndexerError::malformed("Invalid head block number", "number", &head.number))
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
		let request = RestRequest::get(format!("/accounts/{}/balance-info", address)).accept(404);
		let info: Option<SubstrateBalanceInfo> = self.nodes.rest(&request).await?;
		let free = match info {
			Some(info) => decimal::parse_integer(&info.free)?,
			None => BigInt::from(0),
		};
		Ok(vec![free.to_string()])
	}
}
