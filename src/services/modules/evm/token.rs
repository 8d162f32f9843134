//! `evm-erc-20`, `evm-erc-721` and `evm-erc-1155`: token transfers read from logs.

use alloy::{
	dyn_abi::DynSolValue,
	primitives::{Address, U256},
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use tracing::instrument;

use super::{abi, fetch_identity, latest_block, quantity};
use crate::{
	models::{
		blockchain::evm::{format_address, format_hash, u256_to_bigint, EVMReceiptLog},
		BlockContext, BlockId, BlockOutput, Currency, CurrencyFormat, ModuleConfig,
		ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{verify_block_identity, BlockchainTransport, NodeSet, RpcCall, RpcOutcome},
		currency::{check_existing_currencies, KnownCurrencies},
		indexer::{confirmed_height, module_metadata, IndexerError, IndexerModule},
		modules::NoOptions,
		ordering::{renumber, Ledger},
	},
};

/// Token interface whose transfers a module follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStandard {
	Erc20,
	Erc721,
	Erc1155,
}

impl TokenStandard {
	pub fn kind(self) -> ModuleKind {
		match self {
			TokenStandard::Erc20 => ModuleKind::EvmErc20,
			TokenStandard::Erc721 => ModuleKind::EvmErc721,
			TokenStandard::Erc1155 => ModuleKind::EvmErc1155,
		}
	}

	/// Event signatures requested from `eth_getLogs`
	fn events(self) -> &'static [&'static str] {
		match self {
			TokenStandard::Erc20 | TokenStandard::Erc721 => &[abi::TRANSFER_EVENT],
			TokenStandard::Erc1155 => &[abi::TRANSFER_SINGLE_EVENT, abi::TRANSFER_BATCH_EVENT],
		}
	}

	fn is_fungible(self) -> bool {
		self == TokenStandard::Erc20
	}
}

/// One token movement decoded from a log
struct TokenTransfer {
	from: Address,
	to: Address,
	value: U256,
	token_id: Option<U256>,
}

pub struct EvmTokenModule<T> {
	descriptor: ModuleDescriptor,
	standard: TokenStandard,
	nodes: Arc<NodeSet<T>>,
	transfer_topic: String,
	single_topic: String,
	batch_topic: String,
}

impl<T: BlockchainTransport + 'static> EvmTokenModule<T> {
	pub fn new(
		name: String,
		standard: TokenStandard,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let _: NoOptions = config.parse_options()?;
		let mut descriptor = ModuleDescriptor::new(name, standard.kind())
			.with_currency_format(CurrencyFormat::EvmAddress);
		if !standard.is_fungible() {
			descriptor = descriptor.with_extra_indexed();
		}

		Ok(Self {
			descriptor,
			standard,
			nodes,
			transfer_topic: abi::event_topic(abi::TRANSFER_EVENT),
			single_topic: abi::event_topic(abi::TRANSFER_SINGLE_EVENT),
			batch_topic: abi::event_topic(abi::TRANSFER_BATCH_EVENT),
		})
	}

	#[instrument(skip(self))]
	async fn fetch_logs(&self, height: u64) -> Result<Vec<EVMReceiptLog>, IndexerError> {
		let topics: Vec<String> = self
			.standard
			.events()
			.iter()
			.map(|signature| abi::event_topic(signature))
			.collect();
		let filter = json!({
			"fromBlock": quantity(height),
			"toBlock": quantity(height),
			"topics": [topics],
		});
		let logs: Vec<EVMReceiptLog> = self.nodes.request("eth_getLogs", json!([filter])).await?;

		let mut logs: Vec<EVMReceiptLog> = logs.into_iter().filter(|log| !log.removed).collect();
		if let Some(stray) = logs
			.iter()
			.find(|log| log.block_number.is_some_and(|n| n.to::<u64>() != height))
		{
			return Err(IndexerError::integrity_error(
				"Node returned a log of another block",
				None,
				Some(HashMap::from([
					("block".to_string(), height.to_string()),
					("log_block".to_string(), format!("{:?}", stray.block_number)),
				])),
			));
		}
		logs.sort_by_key(EVMReceiptLog::position);
		Ok(logs)
	}

	/// Transfers carried by `log`, empty for logs of another token standard
	fn decode(&self, log: &EVMReceiptLog) -> Vec<TokenTransfer> {
		let Some(signature) = log.topics.first().map(format_hash) else {
			return Vec::new();
		};
		let topics = &log.topics;

		let transfers = match self.standard {
			TokenStandard::Erc20 if signature == self.transfer_topic && topics.len() == 3 => {
				abi::decode_uint(&log.data).map(|value| {
					vec![TokenTransfer {
						from: abi::topic_address(&topics[1]),
						to: abi::topic_address(&topics[2]),
						value,
						token_id: None,
					}]
				})
			}
			TokenStandard::Erc721 if signature == self.transfer_topic && topics.len() == 4 => {
				Some(vec![TokenTransfer {
					from: abi::topic_address(&topics[1]),
					to: abi::topic_address(&topics[2]),
					value: U256::from(1),
					token_id: Some(abi::topic_uint(&topics[3])),
				}])
			}
			TokenStandard::Erc1155 if topics.len() == 4 => {
				let from = abi::topic_address(&topics[2]);
				let to = abi::topic_address(&topics[3]);
				let pairs = if signature == self.single_topic {
					abi::decode_single(&log.data).map(|pair| vec![pair])
				} else if signature == self.batch_topic {
					abi::decode_batch(&log.data)
				} else {
					None
				};
				pairs.map(|pairs| {
					pairs
						.into_iter()
						.map(|(id, value)| TokenTransfer {
							from,
							to,
							value,
							token_id: Some(id),
						})
						.collect()
				})
			}
			_ => Some(Vec::new()),
		};

		transfers.unwrap_or_else(|| {
			tracing::debug!(
				module = %self.descriptor.name,
				contract = %format_address(&log.address),
				"Skipping log with a non-standard body"
			);
			Vec::new()
		})
	}

	/// Metadata of `ids`, a tolerated revert leaving the field empty
	#[instrument(skip(self, ids), fields(count = ids.len()))]
	async fn fetch_currencies(&self, ids: &[String]) -> Result<Vec<Currency>, IndexerError> {
		let mut functions = vec![abi::NAME_FUNCTION, abi::SYMBOL_FUNCTION];
		if self.standard.is_fungible() {
			functions.push(abi::DECIMALS_FUNCTION);
		}

		let calls: Vec<RpcCall> = ids
			.iter()
			.flat_map(|id| functions.iter().map(move |function| (id, *function)))
			.enumerate()
			.map(|(index, (id, function))| {
				RpcCall::new(
					index,
					"eth_call",
					json!([{"to": id, "data": abi::call_data(function, vec![])}, "latest"]),
				)
			})
			.collect();
		let outcomes = self.nodes.call_batch(calls).await?;

		let mut values: Vec<Option<Vec<u8>>> = Vec::with_capacity(outcomes.len());
		for (call, outcome) in outcomes {
			let value = match outcome {
				RpcOutcome::Error { ref message, .. } if abi::is_tolerated_revert(message) => None,
				outcome => match outcome.into_result(&call.method)? {
					Value::String(data) => abi::hex_bytes(&data),
					_ => None,
				},
			};
			values.push(value);
		}

		let currencies = ids
			.iter()
			.zip(values.chunks(functions.len()))
			.map(|(id, fields)| {
				let field = |index: usize| fields.get(index).and_then(Option::as_deref);
				let decimals = if self.standard.is_fungible() {
					Some(field(2).and_then(abi::decode_decimals).unwrap_or(0))
				} else {
					None
				};
				Currency::new(
					id.clone(),
					field(0).and_then(abi::decode_text),
					field(1).and_then(abi::decode_text),
					decimals,
				)
			})
			.collect();
		Ok(currencies)
	}
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for EvmTokenModule<T> {
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

	#[instrument(skip(self, context, known), fields(module = %self.descriptor.name, block = %context.block_id))]
	async fn process_block(
		&self,
		context: &BlockContext,
		known: &dyn KnownCurrencies,
	) -> Result<BlockOutput, IndexerError> {
		let height = confirmed_height(&self.descriptor, context.block_id)?;
		let logs = self.fetch_logs(height).await?;

		let mut ledger = Ledger::new(context);
		let mut contracts: Vec<String> = Vec::new();
		for log in &logs {
			let transfers = self.decode(log);
			if transfers.is_empty() {
				continue;
			}
			let transaction = log
				.transaction_hash
				.as_ref()
				.map(format_hash)
				.ok_or_else(|| {
					IndexerError::malformed(
						"Log without transaction hash",
						"contract",
						format_address(&log.address),
					)
				})?;
			let contract = format_address(&log.address);

			for transfer in transfers {
				let entries = ledger
					.transfer(
						Some(&transaction),
						&format_address(&transfer.from),
						&format_address(&transfer.to),
						&u256_to_bigint(&transfer.value),
					)
					.currency(&contract);
				if let Some(token_id) = transfer.token_id {
					entries.extra_indexed(&token_id.to_string());
				}
			}
			contracts.push(contract);
		}

		let unknown = check_existing_currencies(
			&contracts,
			CurrencyFormat::EvmAddress,
			known,
			&self.descriptor.name,
		);
		let currencies = if unknown.is_empty() {
			Vec::new()
		} else {
			self.fetch_currencies(&unknown).await?
		};

		let mut events = ledger.into_events();
		renumber(&mut events);
		Ok(BlockOutput::with_currencies(events, currencies))
	}

	async fn api_get_balance(
		&self,
		address: &str,
		currencies: &[String],
	) -> Result<Vec<String>, IndexerError> {
		if currencies.is_empty() || self.standard == TokenStandard::Erc1155 {
			return Err(IndexerError::developer_error(
				"Token balances need contract addresses and are not available for ERC-1155",
				None,
				Some(module_metadata(&self.descriptor)),
			));
		}
		let owner: Address = address.parse().map_err(|e| {
			IndexerError::developer_error(
				format!("Invalid address {}", address),
				Some(Box::new(e)),
				Some(module_metadata(&self.descriptor)),
			)
		})?;

		let data = abi::call_data(abi::BALANCE_OF_FUNCTION, vec![DynSolValue::Address(owner)]);
		let calls = currencies
			.iter()
			.enumerate()
			.map(|(index, contract)| {
				RpcCall::new(
					index,
					"eth_call",
					json!([{"to": contract, "data": data}, "latest"]),
				)
			})
			.collect();
		let results: Vec<String> = self.nodes.request_batch(calls).await?;

		results
			.iter()
			.zip(currencies)
			.map(|(result, contract)| {
				abi::hex_bytes(result)
					.as_deref()
					.and_then(abi::decode_uint)
					.map(|balance| u256_to_bigint(&balance).to_string())
					.ok_or_else(|| {
						IndexerError::malformed("Malformed balanceOf result", "contract", contract)
					})
			})
			.collect()
	}
}
