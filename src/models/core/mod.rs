//! Core domain models of the indexer.
//!
//! - Events and currencies: the normalized ledger handed to the sink
//! - Block context: per-block state established by identity verification
//! - Modules: module kinds, configuration and capability descriptors
//! - Networks: node endpoints and operational parameters

pub mod address;
mod block;
mod currency;
mod event;
mod module;
mod network;

pub use block::{BlockAux, BlockContext, BlockOutput};
pub use currency::{Currency, CurrencyFormat};
pub use event::{BlockId, Effect, Event};
pub use module::{ModuleConfig, ModuleDescriptor, ModuleKind};
pub use network::{Network, RpcUrl};
