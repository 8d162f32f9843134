//! Parsers for human-entered configuration values.

use byte_unit::Byte;
use std::str::FromStr;

/// Parses a size such as `"500MB"`, `"1GiB"` or a bare byte count into bytes
pub fn parse_string_to_bytes_size(s: &str) -> Result<u64, String> {
	Byte::from_str(s.trim())
		.map(|byte| byte.as_u64())
		.map_err(|e| format!("Invalid size format: '{}'. Error: {}", s, e))
}

/// Case and whitespace insensitive form of a name, used for duplicate detection
pub fn normalize_string(input: &str) -> String {
	input.trim().to_lowercase()
}
