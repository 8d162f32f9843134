//! Event ordering and aggregation.
//!
//! Conventions every module applies before emitting a block:
//!
//! - events are sorted with a stable multi-key sort and renumbered into a contiguous
//!   `sort_key` sequence starting at 0 (restarting per transaction for the mempool);
//! - unbalanced movements within a transaction are balanced against `the-void`;
//! - per (transaction, currency) the effects sum to zero unless the module opts out.

mod ledger;

pub use ledger::{Entries, Ledger};

use num_bigint::BigInt;
use num_traits::Zero;
use std::collections::{HashMap, HashSet};

use crate::{
	models::{address::THE_VOID, Effect, Event},
	services::indexer::IndexerError,
};

/// Lexicographic ordering key of an event within a block
///
/// `group` is the block-relative transaction index, `phase` the intra-transaction phase
/// (fee before principal, inputs before outputs), `sign` puts debits before credits and
/// `position` is the absolute intra-transaction index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
	pub group: u64,
	pub phase: u32,
	pub sign: u8,
	pub position: u64,
}

impl SortKey {
	pub fn new(group: u64, phase: u32, effect: &Effect, position: u64) -> Self {
		Self {
			group,
			phase,
			sign: if effect.is_negative() { 0 } else { 1 },
			position,
		}
	}
}

/// Stable sort by `key`
pub fn sort_events<K: Ord>(events: &mut [Event], key: impl FnMut(&Event) -> K) {
	events.sort_by_key(key);
}

/// Sorts events tagged with a [`SortKey`], keeping insertion order between equal keys
pub fn order_tagged(mut tagged: Vec<(SortKey, Event)>) -> Vec<Event> {
	tagged.sort_by_key(|(key, _)| *key);
	tagged.into_iter().map(|(_, event)| event).collect()
}

/// Assigns contiguous sort keys from 0 in array order
pub fn renumber(events: &mut [Event]) {
	for (index, event) in events.iter_mut().enumerate() {
		event.sort_key = index as u64;
	}
}

/// Assigns sort keys restarting at 0 for every run of events of the same transaction
pub fn renumber_per_transaction(events: &mut [Event]) {
	let mut previous: Option<Option<String>> = None;
	let mut next = 0u64;
	for event in events.iter_mut() {
		if previous.as_ref() != Some(&event.transaction) {
			previous = Some(event.transaction.clone());
			next = 0;
		}
		event.sort_key = next;
		next += 1;
	}
}

type GroupKey = (Option<String>, Option<String>);

fn group_key(event: &Event) -> GroupKey {
	(event.transaction.clone(), event.currency.clone())
}

/// Residual of every (transaction, currency) group, in order of first appearance
fn residuals(events: &[Event]) -> Vec<(GroupKey, BigInt)> {
	let mut order: Vec<GroupKey> = Vec::new();
	let mut sums: HashMap<GroupKey, BigInt> = HashMap::new();
	for event in events {
		let key = group_key(event);
		let entry = sums.entry(key.clone()).or_insert_with(|| {
			order.push(key);
			BigInt::zero()
		});
		if let Effect::Amount(amount) = &event.effect {
			*entry += amount;
		}
	}
	order
		.into_iter()
		.map(|key| {
			let sum = sums.remove(&key).unwrap_or_default();
			(key, sum)
		})
		.collect()
}

/// Balances every (transaction, currency) group against `the-void`
///
/// A group whose real events sum to a positive residual was minted: the negated residual
/// is debited from `the-void` before the group's first event. A negative residual was
/// burnt: `the-void` is credited after the group's last event.
pub fn synthesize_mint_burn(events: Vec<Event>) -> Vec<Event> {
	let unbalanced: HashMap<GroupKey, BigInt> = residuals(&events)
		.into_iter()
		.filter(|(_, residual)| !residual.is_zero())
		.collect();
	if unbalanced.is_empty() {
		return events;
	}

	let mut last_index: HashMap<GroupKey, usize> = HashMap::new();
	for (index, event) in events.iter().enumerate() {
		last_index.insert(group_key(event), index);
	}

	let counter_event = |template: &Event, residual: &BigInt| {
		let mut void = Event::new(
			template.block,
			template.time.clone(),
			template.transaction.clone(),
			THE_VOID,
			Effect::Amount(-residual),
		);
		void.currency = template.currency.clone();
		void
	};

	let mut seen: HashSet<GroupKey> = HashSet::new();
	let mut output = Vec::with_capacity(events.len() + unbalanced.len());
	for (index, event) in events.into_iter().enumerate() {
		let key = group_key(&event);
		let residual = unbalanced.get(&key);
		let first = seen.insert(key.clone());
		let last = last_index.get(&key) == Some(&index);

		match residual {
			Some(residual) if first && residual > &BigInt::zero() => {
				output.push(counter_event(&event, residual));
				output.push(event);
			}
			Some(residual) if last && residual < &BigInt::zero() => {
				let void = counter_event(&event, residual);
				output.push(event);
				output.push(void);
			}
			_ => output.push(event),
		}
	}
	output
}

/// Merges per-address deltas, preserving the order in which addresses first appear
///
/// Addresses whose deltas cancel out stay in the result with a zero total.
pub fn aggregate_by_address<I>(deltas: I) -> Vec<(String, BigInt)>
where
	I: IntoIterator<Item = (String, BigInt)>,
{
	let mut order: Vec<String> = Vec::new();
	let mut totals: HashMap<String, BigInt> = HashMap::new();
	for (address, delta) in deltas {
		match totals.get_mut(&address) {
			Some(total) => *total += delta,
			None => {
				order.push(address.clone());
				totals.insert(address, delta);
			}
		}
	}
	order
		.into_iter()
		.map(|address| {
			let total = totals.remove(&address).unwrap_or_default();
			(address, total)
		})
		.collect()
}

/// Fails when any (transaction, currency) group does not sum to zero
///
/// Block-level events (no transaction) form one group per currency. A group holding an
/// unknown magnitude cannot be balanced and is not checked.
pub fn check_zero_sum(events: &[Event]) -> Result<(), IndexerError> {
	let hidden: HashSet<GroupKey> = events
		.iter()
		.filter(|event| matches!(event.effect, Effect::Unknown { .. }))
		.map(group_key)
		.collect();
	for ((transaction, currency), residual) in residuals(events) {
		if !residual.is_zero() && !hidden.contains(&(transaction.clone(), currency.clone())) {
			return Err(IndexerError::integrity_error(
				"Effects do not sum to zero",
				None,
				Some(HashMap::from([
					(
						"transaction".to_string(),
						transaction.unwrap_or_else(|| "block".to_string()),
					),
					(
						"currency".to_string(),
						currency.unwrap_or_else(|| "native".to_string()),
					),
					("residual".to_string(), residual.to_string()),
				])),
			));
		}
	}
	Ok(())
}

/// Fails unless sort keys are contiguous from 0, or from 0 per transaction run
pub fn check_sort_keys(events: &[Event], per_transaction: bool) -> Result<(), IndexerError> {
	let mut expected = 0u64;
	let mut previous: Option<&Option<String>> = None;
	for (index, event) in events.iter().enumerate() {
		if per_transaction && previous != Some(&event.transaction) {
			expected = 0;
			previous = Some(&event.transaction);
		}
		if event.sort_key != expected {
			return Err(IndexerError::integrity_error(
				"Sort keys are not contiguous",
				None,
				Some(HashMap::from([
					("index".to_string(), index.to_string()),
					("expected".to_string(), expected.to_string()),
					("found".to_string(), event.sort_key.to_string()),
				])),
			));
		}
		expected += 1;
	}
	Ok(())
}
