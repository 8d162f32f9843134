//! The normalized ledger row.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

use crate::utils::decimal::{self, DecimalError};

/// Identifier of the block an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockId {
	/// A confirmed block, slot, tipset, ledger or epoch number
	Height(u64),
	/// Unconfirmed transactions
	Mempool,
}

impl BlockId {
	const MEMPOOL_WIRE: i64 = -1;

	pub fn height(&self) -> Option<u64> {
		match self {
			BlockId::Height(height) => Some(*height),
			BlockId::Mempool => None,
		}
	}

	pub fn is_mempool(&self) -> bool {
		matches!(self, BlockId::Mempool)
	}
}

impl fmt::Display for BlockId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BlockId::Height(height) => write!(f, "{}", height),
			BlockId::Mempool => write!(f, "mempool"),
		}
	}
}

impl From<u64> for BlockId {
	fn from(height: u64) -> Self {
		BlockId::Height(height)
	}
}

impl Serialize for BlockId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			BlockId::Height(height) => serializer.serialize_u64(*height),
			BlockId::Mempool => serializer.serialize_i64(Self::MEMPOOL_WIRE),
		}
	}
}

impl<'de> Deserialize<'de> for BlockId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let value = i64::deserialize(deserializer)?;
		match value {
			Self::MEMPOOL_WIRE => Ok(BlockId::Mempool),
			v if v >= 0 => Ok(BlockId::Height(v as u64)),
			v => Err(de::Error::custom(format!("invalid block id {}", v))),
		}
	}
}

/// Signed balance change applied by an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
	/// Exact amount in the smallest unit of the currency
	Amount(BigInt),
	/// Known direction, unknown magnitude
	Unknown { negative: bool },
}

impl Effect {
	pub fn amount(value: impl Into<BigInt>) -> Self {
		Effect::Amount(value.into())
	}

	pub fn negated(&self) -> Self {
		match self {
			Effect::Amount(value) => Effect::Amount(-value),
			Effect::Unknown { negative } => Effect::Unknown {
				negative: !negative,
			},
		}
	}

	pub fn is_negative(&self) -> bool {
		match self {
			Effect::Amount(value) => value.is_negative(),
			Effect::Unknown { negative } => *negative,
		}
	}

	pub fn is_zero(&self) -> bool {
		matches!(self, Effect::Amount(value) if value.is_zero())
	}

	/// The exact amount, `None` for unknown magnitudes
	pub fn as_amount(&self) -> Option<&BigInt> {
		match self {
			Effect::Amount(value) => Some(value),
			Effect::Unknown { .. } => None,
		}
	}
}

impl fmt::Display for Effect {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Effect::Amount(value) => write!(f, "{}", value),
			Effect::Unknown { negative: false } => write!(f, "?"),
			Effect::Unknown { negative: true } => write!(f, "-?"),
		}
	}
}

impl FromStr for Effect {
	type Err = DecimalError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"?" => Ok(Effect::Unknown { negative: false }),
			"-?" => Ok(Effect::Unknown { negative: true }),
			other => decimal::parse_integer(other).map(Effect::Amount),
		}
	}
}

impl Serialize for Effect {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Effect {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let value = String::deserialize(deserializer)?;
		value.parse().map_err(de::Error::custom)
	}
}

/// One signed balance movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
	pub block: BlockId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transaction: Option<String>,
	pub sort_key: u64,
	pub time: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub currency: Option<String>,
	pub address: String,
	pub effect: Effect,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub failed: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extra: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extra_indexed: Option<String>,
}

impl Event {
	/// Creates an event with sort key 0. Modules renumber before emitting.
	pub fn new(
		block: BlockId,
		time: impl Into<String>,
		transaction: Option<String>,
		address: impl Into<String>,
		effect: Effect,
	) -> Self {
		Self {
			block,
			transaction,
			sort_key: 0,
			time: time.into(),
			currency: None,
			address: address.into(),
			effect,
			failed: None,
			extra: None,
			extra_indexed: None,
		}
	}

	pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
		self.currency = Some(currency.into());
		self
	}

	pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
		self.extra = Some(extra.into());
		self
	}

	pub fn with_extra_indexed(mut self, extra_indexed: impl Into<String>) -> Self {
		self.extra_indexed = Some(extra_indexed.into());
		self
	}

	/// Marks the event as coming from a failed transaction. `false` leaves the field unset.
	pub fn with_failed(mut self, failed: bool) -> Self {
		self.failed = failed.then_some(true);
		self
	}
}
