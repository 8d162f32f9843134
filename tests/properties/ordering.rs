use crate::properties::strategies::{amount_strategy, events_strategy};

use multichain_indexer::{
	models::Effect,
	services::ordering::{
		aggregate_by_address, check_sort_keys, order_tagged, renumber, renumber_per_transaction,
		SortKey,
	},
};
use num_bigint::BigInt;
use proptest::{prelude::*, test_runner::Config};
use std::collections::HashSet;

proptest! {
	#![proptest_config(Config {
		failure_persistence: None,
		..Config::default()
	})]

	#[test]
	fn test_renumber_gives_contiguous_keys(mut events in events_strategy()) {
		let before = events.clone();
		renumber(&mut events);

		prop_assert!(check_sort_keys(&events, false).is_ok());
		for (renumbered, original) in events.iter().zip(&before) {
			prop_assert_eq!(&renumbered.address, &original.address);
			prop_assert_eq!(&renumbered.transaction, &original.transaction);
		}
	}

	#[test]
	fn test_renumber_per_transaction_restarts_each_run(mut events in events_strategy()) {
		renumber_per_transaction(&mut events);

		prop_assert!(check_sort_keys(&events, true).is_ok());
		for pair in events.windows(2) {
			if pair[0].transaction != pair[1].transaction {
				prop_assert_eq!(pair[1].sort_key, 0);
			} else {
				prop_assert_eq!(pair[1].sort_key, pair[0].sort_key + 1);
			}
		}
	}

	// Sorting is stable: events with equal keys keep their emission order
	#[test]
	fn test_order_tagged_is_a_stable_sort(
		events in events_strategy(),
		tags in prop::collection::vec((0u64..3, 0u32..2, 0u64..4), 24),
	) {
		let tagged: Vec<(SortKey, _)> = events
			.into_iter()
			.enumerate()
			.map(|(index, mut event)| {
				let (group, phase, position) = tags[index];
				let key = SortKey::new(group, phase, &event.effect, position);
				event.sort_key = index as u64;
				(key, event)
			})
			.collect();

		let mut expected: Vec<(SortKey, u64)> = tagged
			.iter()
			.map(|(key, event)| (*key, event.sort_key))
			.collect();
		expected.sort();

		let ordered = order_tagged(tagged);
		let markers: Vec<u64> = ordered.iter().map(|event| event.sort_key).collect();
		prop_assert_eq!(markers, expected.into_iter().map(|(_, marker)| marker).collect::<Vec<_>>());
	}

	#[test]
	fn test_debits_sort_before_credits(
		group in 0u64..100,
		phase in 0u32..4,
		debit in 1i64..1_000_000,
		credit in 0i64..1_000_000,
		debit_position in 0u64..100,
		credit_position in 0u64..100,
	) {
		let debit_key = SortKey::new(group, phase, &Effect::amount(-debit), debit_position);
		let credit_key = SortKey::new(group, phase, &Effect::amount(credit), credit_position);
		prop_assert!(debit_key < credit_key);
	}

	#[test]
	fn test_aggregation_preserves_totals(
		deltas in prop::collection::vec(
			(prop::sample::select(vec!["alice", "bob", "carol"]), amount_strategy()),
			0..20,
		),
	) {
		let deltas: Vec<(String, BigInt)> = deltas
			.into_iter()
			.map(|(address, delta)| (address.to_string(), delta))
			.collect();
		let input_total: BigInt = deltas.iter().map(|(_, delta)| delta).sum();

		let aggregated = aggregate_by_address(deltas.clone());

		let output_total: BigInt = aggregated.iter().map(|(_, total)| total).sum();
		prop_assert_eq!(output_total, input_total);

		let addresses: Vec<&String> = aggregated.iter().map(|(address, _)| address).collect();
		let unique: HashSet<&String> = addresses.iter().copied().collect();
		prop_assert_eq!(unique.len(), addresses.len());

		// First-appearance order
		let mut first_seen: Vec<&String> = Vec::new();
		for (address, _) in &deltas {
			if !first_seen.contains(&address) {
				first_seen.push(address);
			}
		}
		prop_assert_eq!(addresses, first_seen);
	}
}
