//! `beacon-chain`: Ethereum consensus-layer balances, one block per epoch.
//!
//! Validators are addressed by index. Per-slot movements (deposits, withdrawals, proposer
//! and sync-committee rewards, slashings) are grouped under the slot number so each slot
//! nets to zero on its own; attestation rewards are only published per epoch and stay
//! block-level.

use async_trait::async_trait;
use num_bigint::BigInt;
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::{debug, instrument};

use crate::{
	models::{
		address::THE_VOID,
		blockchain::beacon::{
			BeaconAttestationRewards, BeaconBlockRewards, BeaconHeader, BeaconResponse,
			BeaconSignedBlock, BeaconSyncCommitteeReward, BeaconValidator,
		},
		BlockAux, BlockContext, BlockId, BlockOutput, ModuleConfig, ModuleDescriptor, ModuleKind,
	},
	services::{
		blockchain::{
			composite_identity, requester, verify_block_identity, BlockIdentity,
			BlockchainTransport, NodeSet, RestRequest,
		},
		currency::KnownCurrencies,
		indexer::{confirmed_height, IndexerError, IndexerModule},
		modules::vocabulary,
		ordering::{aggregate_by_address, renumber, Ledger},
	},
	utils::{decimal, time},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum BeaconExtra {
	#[strum(serialize = "d")]
	Deposit,
	#[strum(serialize = "w")]
	Withdrawal,
	#[strum(serialize = "p")]
	ProposerReward,
	#[strum(serialize = "s")]
	SyncCommitteeReward,
	#[strum(serialize = "a")]
	AttestationReward,
	#[strum(serialize = "x")]
	SlashingPenalty,
	#[strum(serialize = "y")]
	SlashingReward,
}

impl BeaconExtra {
	pub fn code(self) -> &'static str {
		self.into()
	}
}

const WHISTLEBLOWER_REWARD_QUOTIENT: u32 = 512;
const PROPOSER_WEIGHT: u32 = 8;
const WEIGHT_DENOMINATOR: u32 = 64;
const PHASE0_PROPOSER_REWARD_QUOTIENT: u32 = 8;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct BeaconOptions {
	altair_fork_epoch: u64,
	bellatrix_fork_epoch: u64,
	/// Unix seconds of slot 0
	genesis_time: i64,
	#[serde(default = "default_slots_per_epoch")]
	slots_per_epoch: u64,
	#[serde(default = "default_seconds_per_slot")]
	seconds_per_slot: i64,
}

fn default_slots_per_epoch() -> u64 {
	32
}

fn default_seconds_per_slot() -> i64 {
	12
}

/// Slashing rules in force at an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkRegime {
	Phase0,
	Altair,
	Bellatrix,
}

impl ForkRegime {
	fn for_epoch(epoch: u64, options: &BeaconOptions) -> Self {
		if epoch >= options.bellatrix_fork_epoch {
			ForkRegime::Bellatrix
		} else if epoch >= options.altair_fork_epoch {
			ForkRegime::Altair
		} else {
			ForkRegime::Phase0
		}
	}

	fn min_slashing_penalty_quotient(self) -> u32 {
		match self {
			ForkRegime::Phase0 => 128,
			ForkRegime::Altair => 64,
			ForkRegime::Bellatrix => 32,
		}
	}

	/// Share of the whistleblower reward paid to the block proposer
	fn proposer_reward(self, whistleblower_reward: &BigInt) -> BigInt {
		match self {
			ForkRegime::Phase0 => whistleblower_reward / BigInt::from(PHASE0_PROPOSER_REWARD_QUOTIENT),
			ForkRegime::Altair | ForkRegime::Bellatrix => {
				whistleblower_reward * BigInt::from(PROPOSER_WEIGHT)
					/ BigInt::from(WEIGHT_DENOMINATOR)
			}
		}
	}

	fn has_sync_committee(self) -> bool {
		self != ForkRegime::Phase0
	}
}

pub struct BeaconChainModule<T> {
	descriptor: ModuleDescriptor,
	options: BeaconOptions,
	nodes: Arc<NodeSet<T>>,
}

impl<T: BlockchainTransport + 'static> BeaconChainModule<T> {
	pub fn new(
		name: String,
		config: &ModuleConfig,
		nodes: Arc<NodeSet<T>>,
	) -> Result<Self, IndexerError> {
		let options: BeaconOptions = config.parse_options()?;
		if options.slots_per_epoch == 0 {
			return Err(IndexerError::developer_error(
				"slots_per_epoch must be positive",
				None,
				None,
			));
		}
		Ok(Self {
			descriptor: ModuleDescriptor::new(name, ModuleKind::BeaconChain)
				.with_extra_vocabulary(vocabulary::<BeaconExtra>()),
			options,
			nodes,
		})
	}

	fn slots(&self, epoch: u64) -> Result<std::ops::Range<u64>, IndexerError> {
		let per_epoch = self.options.slots_per_epoch;
		epoch
			.checked_mul(per_epoch)
			.and_then(|first| Some(first..first.checked_add(per_epoch)?))
			.ok_or_else(|| IndexerError::malformed("Epoch is out of range", "epoch", epoch))
	}

	/// Wall-clock time of `slot`
	fn slot_time(&self, slot: u64) -> Result<String, IndexerError> {
		i64::try_from(slot)
			.ok()
			.and_then(|slot| slot.checked_mul(self.options.seconds_per_slot))
			.and_then(|offset| offset.checked_add(self.options.genesis_time))
			.and_then(time::from_unix_seconds)
			.ok_or_else(|| IndexerError::malformed("Slot time is out of range", "slot", slot))
	}

	async fn effective_balance(&self, slot: u64, index: &str) -> Result<BigInt, IndexerError> {
		let request = RestRequest::get(format!("/eth/v1/beacon/states/{}/validators/{}", slot, index));
		let validator: BeaconResponse<BeaconValidator> = self.nodes.rest(&request).await?;
		Ok(decimal::parse_integer(&validator.data.validator.effective_balance)?)
	}

	async fn record_slashing(
		&self,
		ledger: &mut Ledger,
		slot: &str,
		regime: ForkRegime,
		proposer: &str,
		slashed: &str,
	) -> Result<(), IndexerError> {
		let slot_number: u64 = slot.parse().map_err(|_| IndexerError::malformed("Invalid slot", "slot", slot))?;
		let balance = self.effective_balance(slot_number, slashed).await?;
		let penalty = &balance / BigInt::from(regime.min_slashing_penalty_quotient());
		let whistleblower = &balance / BigInt::from(WHISTLEBLOWER_REWARD_QUOTIENT);
		let proposer_reward = regime.proposer_reward(&whistleblower);

		ledger
			.transfer(Some(slot), slashed, THE_VOID, &penalty)
			.extra(BeaconExtra::SlashingPenalty.code());
		// Blocks never name a separate whistleblower, the proposer takes both shares
		ledger
			.transfer(Some(slot), THE_VOID, proposer, &proposer_reward)
			.extra(BeaconExtra::SlashingReward.code());
		ledger
			.transfer(Some(slot), THE_VOID, proposer, &(&whistleblower - &proposer_reward))
			.extra(BeaconExtra::SlashingReward.code());
		Ok(())
	}

	async fn record_slot(
		&self,
		ledger: &mut Ledger,
		regime: ForkRegime,
		block: &BeaconSignedBlock,
		rewards: &BeaconBlockRewards,
		sync_rewards: &[BeaconSyncCommitteeReward],
	) -> Result<(), IndexerError> {
		let message = &block.message;
		let slot = message.slot.as_str();
		let proposer = message.proposer_index.as_str();
		if rewards.proposer_index != proposer {
			return Err(IndexerError::integrity_error(
				"Block rewards name another proposer",
				None,
				Some(HashMap::from([
					("slot".to_string(), slot.to_string()),
					("block".to_string(), proposer.to_string()),
					("rewards".to_string(), rewards.proposer_index.clone()),
				])),
			));
		}

		for deposit in &message.body.deposits {
			let amount = decimal::parse_integer(&deposit.data.amount)?;
			ledger
				.transfer(Some(slot), THE_VOID, &deposit.data.pubkey, &amount)
				.extra(BeaconExtra::Deposit.code());
		}

		let withdrawals = message
			.body
			.execution_payload
			.as_ref()
			.map(|payload| payload.withdrawals.as_slice())
			.unwrap_or_default();
		for withdrawal in withdrawals {
			let amount = decimal::parse_integer(&withdrawal.amount)?;
			ledger
				.transfer(Some(slot), &withdrawal.validator_index, THE_VOID, &amount)
				.extra(BeaconExtra::Withdrawal.code());
		}

		// Slashing rewards are recomputed below, only inclusion rewards are taken as is
		let proposer_reward = decimal::parse_integer(&rewards.attestations)?
			+ decimal::parse_integer(&rewards.sync_aggregate)?;
		ledger
			.transfer(Some(slot), THE_VOID, proposer, &proposer_reward)
			.extra(BeaconExtra::ProposerReward.code());

		let mut sync = Vec::with_capacity(sync_rewards.len());
		for reward in sync_rewards {
			sync.push((reward.validator_index.clone(), decimal::parse_integer(&reward.reward)?));
		}
		for (validator, reward) in aggregate_by_address(sync) {
			ledger
				.transfer(Some(slot), THE_VOID, &validator, &reward)
				.extra(BeaconExtra::SyncCommitteeReward.code());
		}

		for slashing in &message.body.proposer_slashings {
			let slashed = &slashing.signed_header_1.message.proposer_index;
			self.record_slashing(ledger, slot, regime, proposer, slashed).await?;
		}
		for slashing in &message.body.attester_slashings {
			for slashed in slashing.slashed_indices() {
				self.record_slashing(ledger, slot, regime, proposer, &slashed).await?;
			}
		}
		Ok(())
	}

	#[instrument(skip(self, context), fields(block = %context.block_id))]
	async fn process(&self, context: &BlockContext) -> Result<BlockOutput, IndexerError> {
		let epoch = confirmed_height(&self.descriptor, context.block_id)?;
		let regime = ForkRegime::for_epoch(epoch, &self.options);
		let roots = match &context.aux {
			BlockAux::EpochSlots(roots) => roots.clone(),
			_ => fetch_roots(self.nodes.primary.as_ref(), self.slots(epoch)?, self.nodes.limit).await?,
		};
		let slots: Vec<u64> = self
			.slots(epoch)?
			.zip(roots.iter())
			.filter_map(|(slot, root)| root.as_ref().map(|_| slot))
			.collect();
		debug!(epoch, produced = slots.len(), "Processing epoch");

		let blocks: Vec<BeaconResponse<BeaconSignedBlock>> = self
			.nodes
			.rest_batch(
				slots
					.iter()
					.map(|slot| RestRequest::get(format!("/eth/v2/beacon/blocks/{}", slot)))
					.collect(),
			)
			.await?;
		let rewards: Vec<BeaconResponse<BeaconBlockRewards>> = self
			.nodes
			.rest_batch(
				slots
					.iter()
					.map(|slot| RestRequest::get(format!("/eth/v1/beacon/rewards/blocks/{}", slot)))
					.collect(),
			)
			.await?;
		let sync_rewards: Vec<BeaconResponse<Vec<BeaconSyncCommitteeReward>>> =
			if regime.has_sync_committee() {
				self.nodes
					.rest_batch(
						slots
							.iter()
							.map(|slot| {
								RestRequest::post(
									format!("/eth/v1/beacon/rewards/sync_committee/{}", slot),
									json!([]),
								)
							})
							.collect(),
					)
					.await?
			} else {
				slots.iter().map(|_| BeaconResponse { data: Vec::new() }).collect()
			};

		let mut ledger = Ledger::new(context);
		for (((slot, block), rewards), sync) in slots.iter().zip(&blocks).zip(&rewards).zip(&sync_rewards) {
			if block.data.message.slot != slot.to_string() {
				return Err(IndexerError::malformed(
					"Block belongs to another slot",
					"slot",
					slot,
				));
			}
			ledger.set_time(self.slot_time(*slot)?);
			self.record_slot(&mut ledger, regime, &block.data, &rewards.data, &sync.data)
				.await?;
		}
		// Attestation rewards belong to the epoch as a whole
		ledger.set_time(context.time());

		let attestations: BeaconResponse<BeaconAttestationRewards> = self
			.nodes
			.rest(&RestRequest::post(
				format!("/eth/v1/beacon/rewards/attestations/{}", epoch),
				json!([]),
			))
			.await?;
		let mut totals = Vec::with_capacity(attestations.data.total_rewards.len());
		for reward in &attestations.data.total_rewards {
			let mut total = decimal::parse_integer(&reward.head)?
				+ decimal::parse_integer(&reward.target)?
				+ decimal::parse_integer(&reward.source)?;
			if let Some(inactivity) = &reward.inactivity {
				total += decimal::parse_integer(inactivity)?;
			}
			totals.push((reward.validator_index.clone(), total));
		}
		for (validator, total) in aggregate_by_address(totals) {
			ledger
				.transfer(None, THE_VOID, &validator, &total)
				.extra(BeaconExtra::AttestationReward.code());
		}

		let mut events = ledger.into_events();
		renumber(&mut events);
		Ok(BlockOutput::events(events))
	}
}

/// Header root of every slot, `None` where the slot was missed
async fn fetch_roots<T: BlockchainTransport>(
	node: &T,
	slots: std::ops::Range<u64>,
	limit: usize,
) -> Result<Vec<Option<String>>, IndexerError> {
	let requests = slots
		.map(|slot| RestRequest::get(format!("/eth/v1/beacon/headers/{}", slot)).accept(404))
		.collect();
	let headers: Vec<Option<BeaconResponse<BeaconHeader>>> =
		requester::rest_batch(node, requests, limit).await?;
	Ok(headers
		.into_iter()
		.map(|header| header.map(|header| header.data.root))
		.collect())
}

async fn fetch_identity<T: BlockchainTransport>(
	node: Arc<T>,
	slots: std::ops::Range<u64>,
	limit: usize,
	time: Option<String>,
) -> Result<BlockIdentity, IndexerError> {
	let roots = fetch_roots(node.as_ref(), slots, limit).await?;
	let parts: Vec<&str> = roots
		.iter()
		.map(|root| root.as_deref().unwrap_or("missed"))
		.collect();
	Ok(BlockIdentity::new(composite_identity(parts.as_slice()), time).with_aux(BlockAux::EpochSlots(roots)))
}

#[async_trait]
impl<T: BlockchainTransport + 'static> IndexerModule for BeaconChainModule<T> {
	fn descriptor(&self) -> &ModuleDescriptor {
		&self.descriptor
	}

	/// Latest epoch whose every slot is behind the head
	async fn inquire_latest_block(&self) -> Result<u64, IndexerError> {
		let head: BeaconResponse<BeaconHeader> = self
			.nodes
			.rest(&RestRequest::get("/eth/v1/beacon/headers/head"))
			.await?;
		let slot: u64 = head
			.data
			.header
			.message
			.slot
			.parse()
			.map_err(|_| IndexerError::malformed("Invalid head slot", "slot", &head.data.header.message.slot))?;
		Ok(((slot + 1) / self.options.slots_per_epoch).saturating_sub(1))
	}

	async fn ensure_block(&self, block_id: BlockId) -> Result<BlockContext, IndexerError> {
		let epoch = confirmed_height(&self.descriptor, block_id)?;
		let slots = self.slots(epoch)?;
		let time = Some(self.slot_time(slots.start)?);
		let limit = self.nodes.limit;
		let identity = verify_block_identity(
			&self.nodes.consensus_nodes(),
			limit,
			move |node| fetch_identity(node, slots.clone(), limit, time.clone()),
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
		let request =
			RestRequest::get(format!("/eth/v1/beacon/states/head/validators/{}", address)).accept(404);
		let validator: Option<BeaconResponse<BeaconValidator>> = self.nodes.rest(&request).await?;
		Ok(vec![match validator {
			Some(validator) => decimal::parse_integer(&validator.data.balance)?.to_string(),
			None => "0".to_string(),
		}])
	}
}
