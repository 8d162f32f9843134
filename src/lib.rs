//! Multichain balance-event indexer.
//!
//! This library turns blocks of many different blockchains into one normalized stream of
//! balance-changing events. It includes:
//!
//! - Configuration management through JSON files, one per network
//! - Node transports with endpoint rotation and block identity verification across nodes
//! - Per-chain normalization modules (EVM, UTXO, Substrate, beacon chain, Cosmos, Solana,
//!   Filecoin, XRP Ledger, Stellar)
//! - Event ordering, fee and mint/burn reconciliation, currency deduplication
//! - File and in-memory sinks, and cron-driven block watchers
//!
//! # Module Structure
//!
//! - `bootstrap`: Bootstraps the application
//! - `models`: Data structures for configuration, events and node responses
//! - `services`: Core indexing logic and blockchain interaction
//! - `utils`: Common utilities and helper functions

pub mod bootstrap;
pub mod models;
pub mod services;
pub mod utils;
