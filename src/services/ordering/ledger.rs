//! Event accumulation for one block.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::models::{BlockContext, BlockId, Effect, Event};

/// Collects the events of one block in emission order
///
/// Zero movements are not recorded: [`Ledger::transfer`] and [`Ledger::movement`] return
/// an empty [`Entries`] for them so tagging calls stay uniform.
#[derive(Debug, Clone)]
pub struct Ledger {
	block: BlockId,
	time: String,
	events: Vec<Event>,
}

impl Ledger {
	pub fn new(context: &BlockContext) -> Self {
		Self {
			block: context.block_id,
			time: context.time().to_string(),
			events: Vec::new(),
		}
	}

	/// Ledger whose events carry their own time (mempool transactions)
	pub fn with_time(block: BlockId, time: impl Into<String>) -> Self {
		Self {
			block,
			time: time.into(),
			events: Vec::new(),
		}
	}

	pub fn set_time(&mut self, time: impl Into<String>) {
		self.time = time.into();
	}

	/// Debits `from` and credits `to` with `amount`, in that order
	pub fn transfer(
		&mut self,
		transaction: Option<&str>,
		from: &str,
		to: &str,
		amount: &BigInt,
	) -> Entries<'_> {
		let start = self.events.len();
		if !amount.is_zero() {
			self.push(transaction, from, Effect::Amount(-amount));
			self.push(transaction, to, Effect::Amount(amount.clone()));
		}
		Entries {
			events: &mut self.events[start..],
		}
	}

	/// Records a single movement against `address`
	pub fn movement(&mut self, transaction: Option<&str>, address: &str, effect: Effect) -> Entries<'_> {
		let start = self.events.len();
		if !effect.is_zero() {
			self.push(transaction, address, effect);
		}
		Entries {
			events: &mut self.events[start..],
		}
	}

	pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
		self.events.extend(events);
	}

	fn push(&mut self, transaction: Option<&str>, address: &str, effect: Effect) {
		self.events.push(Event::new(
			self.block,
			self.time.clone(),
			transaction.map(str::to_string),
			address,
			effect,
		));
	}

	pub fn len(&self) -> usize {
		self.events.len()
	}

	pub fn is_empty(&self) -> bool {
		self.events.is_empty()
	}

	pub fn into_events(self) -> Vec<Event> {
		self.events
	}
}

/// Events just recorded, for tagging
pub struct Entries<'a> {
	events: &'a mut [Event],
}

impl Entries<'_> {
	pub fn currency(self, currency: &str) -> Self {
		for event in self.events.iter_mut() {
			event.currency = Some(currency.to_string());
		}
		self
	}

	pub fn extra(self, extra: &str) -> Self {
		for event in self.events.iter_mut() {
			event.extra = Some(extra.to_string());
		}
		self
	}

	pub fn extra_indexed(self, extra_indexed: &str) -> Self {
		for event in self.events.iter_mut() {
			event.extra_indexed = Some(extra_indexed.to_string());
		}
		self
	}

	pub fn failed(self, failed: bool) -> Self {
		for event in self.events.iter_mut() {
			event.failed = failed.then_some(true);
		}
		self
	}

	pub fn len(&self) -> usize {
		self.events.len()
	}

	pub fn is_empty(&self) -> bool {
		self.events.is_empty()
	}
}
