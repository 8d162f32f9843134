//! `evm-trace`: native coin moved by internal calls.
//!
//! Top-level value transfers belong to `evm-main`; this module only reports what contracts
//! move on their own. Traces come either from geth's `callTracer` or from the flat
//! `trace_block` format of Erigon and Nethermind.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, str::FromStr, sync::Arc};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::instrument;

use super::{fetch_identity, latest_block, quantity};
use crate::{
	models::{
		blockchain::evm::{
			format_address, format_hash, u256_to_bigint, EVMCallFrame, EVMParityTrace,
			EVMTraceResult,
		},
		BlockAux, BlockContext, BlockId, BlockOutput, ModuleConfig, ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{verify_block_identity, BlockchainTransport, NodeSet},
		currency::KnownCurrencies,
		indexer::{confirmed_height, IndexerError, IndexerModule},
		modules::vocabulary,
		ordering::{renumber, Ledger},
	},
};

/// Node API the traces are read from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMethod {
	/// `debug_traceBlockByNumber` with the `callTracer`
	#[default]
	Debug,
	/// `trace_block`
	Parity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum EvmTraceExtra {
	#[strum(serialize = "c")]
	Call,
	#[strum(serialize = "n")]
	Create,
	#[strum(serialize = "d")]
	SelfDestruct,
}

impl EvmTraceExtra {
	pub fn code(self) -> &'static str {
		self.into()
	}
}

/// Call types of both trace formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
enum CallType {
	Call,
	Create,
	Create2,
	#[strum(serialize = "selfdestruct", serialize = "suicide")]
	SelfDestruct,
	StaticCall,
	DelegateCall,
	CallCode,
}

impl CallType {
	fn parse(value: &str, transaction: &str) -> Result<Self, IndexerError> {
		CallType::from_str(value).map_err(|_| {
			IndexerError::integrity_error(
				"unknown call type",
				None,
				Some(HashMap::from([
					("type".to_string(), value.to_string()),
					("transaction".to_string(), transaction.to_string()),
				])),
			)
		})
	}

	/// Extra code of the value moved by this call type, `None` if it never moves value
	fn extra(self) -> Option<EvmTraceExtra> {
		match self {
			CallType::Call => Some(EvmTraceExtra::Call),
			CallType::Create | CallType::Create2 => Some(EvmTraceExtra::Create),
			CallType::SelfDestruct => Some(EvmTraceExtra::SelfDestruct),
			CallType::StaticCall | CallType::DelegateCall | CallType::CallCode => None,
		}
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EvmTraceOptions {
	#[serde(default)]
	trace_method: TraceMethod,
}

pub struct EvmTraceModule<T> {
	descriptor: ModuleDescriptor,
	nodes: Arc<NodeSet<T>>,
	method: TraceMethod,
}

impl<T: BlockchainTransport + 'static> EvmTraceModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let options: EvmTraceOptions = config.parse_options()?;
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::EvmTrace)
				.with_extra_vocabulary(vocabulary::<EvmTraceExtra>()),
			nodes,
			method: options.trace_method,
		})
	}

	/// Transaction hashes of the block, taken from the verified identity when present
	async fn transaction_hashes(&self, context: &BlockContext) -> Result<Vec<String>, IndexerError> {
		if let BlockAux::TransactionHashes(hashes) = &context.aux {
			return Ok(hashes.clone());
		}
		let height = confirmed_height(&self.descriptor, context.block_id)?;
		let identity = fetch_identity(self.nodes.primary.clone(), height).await?;
		match identity.aux {
			BlockAux::TransactionHashes(hashes) => Ok(hashes),
			_ => Ok(Vec::new()),
		}
	}

	#[instrument(skip(self, hashes, ledger))]
	async fn process_debug(
		&self,
		height: u64,
		hashes: &[String],
		ledger: &mut Ledger,
	) -> Result<(), IndexerError> {
		let traces: Vec<EVMTraceResult> = self
			.nodes
			.request(
				"debug_traceBlockByNumber",
				json!([quantity(height), {"tracer": "callTracer"}]),
			)
			.await?;
		check_trace_count(height, hashes.len(), traces.len())?;

		for (hash, trace) in hashes.iter().zip(&traces) {
			if let Some(traced) = trace.tx_hash.as_ref().map(format_hash) {
				if traced != *hash {
					return Err(IndexerError::integrity_error(
						"Trace does not belong to the transaction",
						None,
						Some(HashMap::from([
							("transaction".to_string(), hash.clone()),
							("trace".to_string(), traced),
						])),
					));
				}
			}
			if trace.result.error.is_some() {
				continue;
			}
			record_subcalls(&trace.result, hash, ledger)?;
		}
		Ok(())
	}

	#[instrument(skip(self, hashes, ledger))]
	async fn process_parity(
		&self,
		height: u64,
		hashes: &[String],
		ledger: &mut Ledger,
	) -> Result<(), IndexerError> {
		let traces: Vec<EVMParityTrace> = self
			.nodes
			.request("trace_block", json!([quantity(height)]))
			.await?;

		let mut by_transaction: HashMap<String, Vec<&EVMParityTrace>> = HashMap::new();
		for trace in &traces {
			// Block and uncle rewards carry no transaction
			if let Some(hash) = trace.transaction_hash.as_ref().map(format_hash) {
				by_transaction.entry(hash).or_default().push(trace);
			}
		}
		check_trace_count(height, hashes.len(), by_transaction.len())?;

		for hash in hashes {
			let mut group = by_transaction.remove(hash).ok_or_else(|| {
				IndexerError::malformed("Transaction has no trace", "transaction", hash)
			})?;
			group.sort_by(|a, b| a.trace_address.cmp(&b.trace_address));

			let mut reverted: Vec<&[u64]> = Vec::new();
			for trace in group {
				let path = trace.trace_address.as_slice();
				if reverted.iter().any(|prefix| path.starts_with(prefix)) {
					continue;
				}
				if trace.error.is_some() {
					reverted.push(path);
					continue;
				}
				if path.is_empty() {
					continue;
				}
				record_parity(trace, hash, ledger)?;
			}
		}
		Ok(())
	}
}

fn check_trace_count(height: u64, transactions: usize, traces: usize) -> Result<(), IndexerError> {
	if transactions == traces {
		return Ok(());
	}
	Err(IndexerError::integrity_error(
		"Trace count does not match transaction count",
		None,
		Some(HashMap::from([
			("block".to_string(), height.to_string()),
			("transactions".to_string(), transactions.to_string()),
			("traces".to_string(), traces.to_string()),
		])),
	))
}

/// Depth-first over the children of `frame`, dropping reverted subtrees
fn record_subcalls(frame: &EVMCallFrame, transaction: &str, ledger: &mut Ledger) -> Result<(), IndexerError> {
	for call in &frame.calls {
		if call.error.is_some() {
			continue;
		}
		let call_type = CallType::parse(&call.call_type, transaction)?;
		record_value(
			ledger,
			transaction,
			call_type,
			Some(call.from),
			call.to,
			call.value,
		)?;
		record_subcalls(call, transaction, ledger)?;
	}
	Ok(())
}

fn record_parity(trace: &EVMParityTrace, transaction: &str, ledger: &mut Ledger) -> Result<(), IndexerError> {
	let action = &trace.action;
	match trace.trace_type.as_str() {
		"call" => {
			let call_type = CallType::parse(action.call_type.as_deref().unwrap_or("call"), transaction)?;
			record_value(ledger, transaction, call_type, action.from, action.to, action.value)
		}
		"create" => {
			let created = trace.result.as_ref().and_then(|result| result.address);
			record_value(ledger, transaction, CallType::Create, action.from, created, action.value)
		}
		"suicide" | "selfdestruct" => record_value(
			ledger,
			transaction,
			CallType::SelfDestruct,
			action.address,
			action.refund_address,
			action.balance,
		),
		"reward" => Ok(()),
		other => CallType::parse(other, transaction).map(|_| ()),
	}
}

fn record_value(
	ledger: &mut Ledger,
	transaction: &str,
	call_type: CallType,
	from: Option<Address>,
	to: Option<Address>,
	value: Option<U256>,
) -> Result<(), IndexerError> {
	let Some(extra) = call_type.extra() else {
		return Ok(());
	};
	let value = value.unwrap_or_default();
	if value.is_zero() {
		return Ok(());
	}
	let (Some(from), Some(to)) = (from, to) else {
		return Err(IndexerError::malformed(
			"Value moving call without both parties",
			"transaction",
			transaction,
		));
	};
	ledger
		.transfer(
			Some(transaction),
			&format_address(&from),
			&format_address(&to),
			&u256_to_bigint(&value),
		)
		.extra(extra.code());
	Ok(())
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for EvmTraceModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		latest_block(self.nodes.primary.as_ref()).await
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

	#[instrument(skip(self, context, _known), fields(module = %self.descriptor.name, block = %context.block_id))]
	async fn process_block(
		&self,
		context: &BlockContext,
		_known: &dyn KnownCurrencies,
	) -> Result<BlockOutput, IndexerError> {
		let height = confirmed_height(&self.descriptor, context.block_id)?;
		let hashes = self.transaction_hashes(context).await?;

		let mut ledger = Ledger::new(context);
		match self.method {
			TraceMethod::Debug => self.process_debug(height, &hashes, &mut ledger).await?,
			TraceMethod::Parity => self.process_parity(height, &hashes, &mut ledger).await?,
		}

		let mut events = ledger.into_events();
		renumber(&mut events);
		Ok(BlockOutput::events(events))
	}
}
