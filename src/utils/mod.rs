//! Utility modules for common functionality.
//!
//! - client_storage: Shared storage for per-network clients
//! - cron_utils: Utilities for working with cron schedules and time intervals
//! - decimal: Exact arithmetic over decimal integer strings
//! - http: HTTP client utilities (i.e. creation of retryable HTTP clients)
//! - logging: Logging utilities
//! - pagination: Lazy cursor pagination
//! - parsing: Parsing utilities
//! - tests: Test utilities
//! - time: Chain timestamp conversion

mod cron_utils;

pub mod client_storage;
pub mod decimal;
pub mod http;
pub mod logging;
pub mod pagination;
pub mod parsing;
pub mod time;

pub use client_storage::ClientStorage;
pub use cron_utils::*;
pub use http::*;
pub use parsing::*;
