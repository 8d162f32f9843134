//! Domain models and data structures for blockchain indexing.
//!
//! This module contains the plain data used throughout the application:
//!
//! - `blockchain`: Node response shapes per chain family
//! - `config`: Configuration loading and validation
//! - `core`: Core domain models (Event, Currency, BlockContext, Network, ModuleConfig)
//! - `security`: Security models (Secret)

pub mod blockchain;
mod config;
mod core;
mod security;

// Re-export blockchain types
pub use blockchain::BlockChainType;

// Re-export core types
pub use core::{
	address, BlockAux, BlockContext, BlockId, BlockOutput, Currency, CurrencyFormat, Effect,
	Event, ModuleConfig, ModuleDescriptor, ModuleKind, Network, RpcUrl,
};

// Re-export config types
pub use config::{ConfigError, ConfigLoader};

// Re-export security types
pub use security::{SecretString, SecretValue, SecurityError};
