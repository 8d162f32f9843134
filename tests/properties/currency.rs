use crate::properties::strategies::currency_candidate_strategy;

use multichain_indexer::{models::CurrencyFormat, services::currency::filter_unknown};
use proptest::{prelude::*, test_runner::Config};
use std::collections::HashSet;

const MODULE: &str = "ethereum-evm-erc-20";

proptest! {
	#![proptest_config(Config {
		failure_persistence: None,
		..Config::default()
	})]

	#[test]
	fn test_gate_output_is_unique_and_unknown(
		candidates in currency_candidate_strategy(),
		known_count in 0usize..4,
	) {
		let known: HashSet<String> = candidates
			.iter()
			.filter_map(|candidate| CurrencyFormat::EvmAddress.normalize(candidate))
			.take(known_count)
			.collect();

		let unknown = filter_unknown(&candidates, CurrencyFormat::EvmAddress, &known, MODULE);

		let unique: HashSet<&String> = unknown.iter().collect();
		prop_assert_eq!(unique.len(), unknown.len());
		for id in &unknown {
			prop_assert!(!known.contains(id));
			prop_assert!(candidates
				.iter()
				.any(|candidate| CurrencyFormat::EvmAddress.normalize(candidate).as_ref() == Some(id)));
		}
	}

	// Filtering an already filtered list changes nothing
	#[test]
	fn test_gate_is_idempotent(candidates in currency_candidate_strategy()) {
		let known: HashSet<String> = HashSet::new();

		let once = filter_unknown(&candidates, CurrencyFormat::EvmAddress, &known, MODULE);
		let twice = filter_unknown(&once, CurrencyFormat::EvmAddress, &known, MODULE);
		prop_assert_eq!(&twice, &once);

		// Once recorded downstream, nothing is fetched again
		let recorded: HashSet<String> = once.iter().cloned().collect();
		prop_assert!(filter_unknown(&candidates, CurrencyFormat::EvmAddress, &recorded, MODULE).is_empty());
	}
}
