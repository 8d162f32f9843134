//! Per-chain normalization modules.
//!
//! One submodule per chain family. Every module implements
//! [`crate::services::indexer::IndexerModule`] and is generic over the node transport so
//! tests can run it against canned responses.

pub mod beacon;
pub mod cosmos;
pub mod evm;
pub mod filecoin;
pub mod ripple;
pub mod solana;
pub mod starknet;
pub mod stellar;
pub mod substrate;
pub mod tron;
pub mod utxo;

use strum::IntoEnumIterator;

/// Every code of an extra-tag vocabulary enum
pub(crate) fn vocabulary<E>() -> Vec<&'static str>
where
	E: IntoEnumIterator + Into<&'static str>,
{
	E::iter().map(Into::into).collect()
}

/// Options of modules that take none; any key is rejected at construction
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct NoOptions {}
