//! Currency deduplication gate.
//!
//! Metadata lookups are expensive (several `eth_call`s per token, one REST call per
//! denom), so modules ask the gate which of the currencies seen in a block are not yet
//! known downstream before fetching anything. The gate is a pure function of the
//! read-only [`KnownCurrencies`] state: no I/O, no mutation.

use std::collections::HashSet;

use crate::models::CurrencyFormat;

/// Read-only view of the currencies already recorded downstream
pub trait KnownCurrencies: Send + Sync {
	fn is_known(&self, module: &str, id: &str) -> bool;

	fn known_ids(&self, module: &str) -> Vec<String>;
}

/// Nothing is known; every candidate is fetched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKnownCurrencies;

impl KnownCurrencies for NoKnownCurrencies {
	fn is_known(&self, _module: &str, _id: &str) -> bool {
		false
	}

	fn known_ids(&self, _module: &str) -> Vec<String> {
		Vec::new()
	}
}

/// A fixed id set, shared by every module
impl KnownCurrencies for HashSet<String> {
	fn is_known(&self, _module: &str, id: &str) -> bool {
		self.contains(id)
	}

	fn known_ids(&self, _module: &str) -> Vec<String> {
		let mut ids: Vec<String> = self.iter().cloned().collect();
		ids.sort();
		ids
	}
}

/// Returns the normalized candidates that are not known yet, in first-seen order
///
/// Candidates that are not valid ids in `format` are dropped.
pub fn filter_unknown<I, S>(
	candidates: I,
	format: CurrencyFormat,
	known: &dyn KnownCurrencies,
	module: &str,
) -> Vec<String>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut seen = HashSet::new();
	let mut unknown = Vec::new();
	for candidate in candidates {
		let Some(id) = format.normalize(candidate.as_ref()) else {
			tracing::debug!(
				module = module,
				candidate = candidate.as_ref(),
				"Dropping currency id that does not match its format"
			);
			continue;
		};
		if seen.insert(id.clone()) && !known.is_known(module, &id) {
			unknown.push(id);
		}
	}
	unknown
}

/// Name kept for modules; same as [`filter_unknown`]
pub fn check_existing_currencies<I, S>(
	candidates: I,
	format: CurrencyFormat,
	known: &dyn KnownCurrencies,
	module: &str,
) -> Vec<String>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	filter_unknown(candidates, format, known, module)
}
