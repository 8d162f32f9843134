//! Test helper utilities for normalized events
//!
//! - `EventBuilder`: Builder for creating test Event instances

use crate::models::{BlockId, Effect, Event};

/// Builder for creating test Event instances
pub struct EventBuilder {
	event: Event,
}

impl Default for EventBuilder {
	fn default() -> Self {
		Self {
			event: Event::new(
				BlockId::Height(1),
				"2024-01-01 00:00:00",
				Some("0xtx".to_string()),
				"alice",
				Effect::amount(0),
			),
		}
	}
}

impl EventBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn block(mut self, block: BlockId) -> Self {
		self.event.block = block;
		self
	}

	pub fn transaction(mut self, transaction: &str) -> Self {
		self.event.transaction = Some(transaction.to_string());
		self
	}

	/// Block-level event without a transaction
	pub fn no_transaction(mut self) -> Self {
		self.event.transaction = None;
		self
	}

	pub fn sort_key(mut self, sort_key: u64) -> Self {
		self.event.sort_key = sort_key;
		self
	}

	pub fn time(mut self, time: &str) -> Self {
		self.event.time = time.to_string();
		self
	}

	pub fn currency(mut self, currency: &str) -> Self {
		self.event.currency = Some(currency.to_string());
		self
	}

	pub fn address(mut self, address: &str) -> Self {
		self.event.address = address.to_string();
		self
	}

	pub fn amount(mut self, amount: i64) -> Self {
		self.event.effect = Effect::amount(amount);
		self
	}

	pub fn effect(mut self, effect: Effect) -> Self {
		self.event.effect = effect;
		self
	}

	pub fn failed(mut self) -> Self {
		self.event.failed = Some(true);
		self
	}

	pub fn extra(mut self, extra: &str) -> Self {
		self.event.extra = Some(extra.to_string());
		self
	}

	pub fn extra_indexed(mut self, extra_indexed: &str) -> Self {
		self.event.extra_indexed = Some(extra_indexed.to_string());
		self
	}

	pub fn build(self) -> Event {
		self.event
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_sets_fields() {
		let event = EventBuilder::new()
			.block(BlockId::Height(9))
			.no_transaction()
			.address("the-void")
			.amount(-3)
			.currency("uatom")
			.extra("f")
			.sort_key(2)
			.build();
		assert_eq!(event.block, BlockId::Height(9));
		assert_eq!(event.transaction, None);
		assert_eq!(event.effect.to_string(), "-3");
		assert_eq!(event.currency.as_deref(), Some("uatom"));
		assert_eq!(event.sort_key, 2);
		assert_eq!(event.failed, None);
	}
}
