//! Core services implementing the indexing logic.
//!
//! This module contains the main service implementations:
//! - `blockchain`: Node transports, requester, identity verification and client pool
//! - `blockwatcher`: Cron-driven block processing per network and module
//! - `currency`: Deduplication of currencies already recorded downstream
//! - `indexer`: Module contract, module factory and block processor
//! - `modules`: Per-chain normalization modules
//! - `ordering`: Event ordering, reconciliation and aggregation helpers
//! - `sink`: Destinations of normalized events and currencies

pub mod blockchain;
pub mod blockwatcher;
pub mod currency;
pub mod indexer;
pub mod modules;
pub mod ordering;
pub mod sink;
