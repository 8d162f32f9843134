//! Exact arithmetic over decimal integer strings.
//!
//! Every amount handled by the indexer is an integer in the chain's smallest unit and is
//! routinely wider than 64 bits, so values travel as [`BigInt`] internally and as base-10
//! strings on the wire. Node responses that report amounts as decimal coin values
//! (`"50.00000000"`) are scaled to integers with [`scale_decimal`], which refuses any
//! conversion that would lose precision.

use bigdecimal::BigDecimal;
use num_bigint::{BigInt, Sign};
use num_traits::{Signed, Zero};
use std::{cmp::Ordering, collections::HashMap, str::FromStr};
use thiserror::Error as ThisError;

use crate::utils::logging::error::{ErrorContext, TraceableError};

/// Errors produced while parsing or combining decimal values
#[derive(ThisError, Debug)]
pub enum DecimalError {
	/// The input is not a valid number in the expected notation
	#[error("Parse error: {0}")]
	ParseError(ErrorContext),

	/// The operation is undefined or would lose precision
	#[error("Arithmetic error: {0}")]
	ArithmeticError(ErrorContext),
}

impl DecimalError {
	pub fn parse_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ParseError(ErrorContext::new(msg, source, metadata))
	}

	pub fn arithmetic_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ArithmeticError(ErrorContext::new(msg, source, metadata))
	}
}

impl TraceableError for DecimalError {
	fn trace_id(&self) -> String {
		match self {
			Self::ParseError(ctx) => ctx.trace_id.clone(),
			Self::ArithmeticError(ctx) => ctx.trace_id.clone(),
		}
	}
}

fn input_metadata(value: &str) -> Option<HashMap<String, String>> {
	Some(HashMap::from([("input".to_string(), value.to_string())]))
}

/// Parses a base-10 integer with an optional sign.
pub fn parse_integer(value: &str) -> Result<BigInt, DecimalError> {
	let trimmed = value.trim();
	let digits = trimmed
		.strip_prefix('-')
		.or_else(|| trimmed.strip_prefix('+'))
		.unwrap_or(trimmed);
	if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
		return Err(DecimalError::parse_error(
			"Invalid decimal integer",
			None,
			input_metadata(value),
		));
	}
	BigInt::from_str(trimmed).map_err(|e| {
		DecimalError::parse_error("Invalid decimal integer", Some(Box::new(e)), input_metadata(value))
	})
}

/// Parses a `0x`-prefixed hexadecimal quantity. `"0x"` is zero.
pub fn parse_hex(value: &str) -> Result<BigInt, DecimalError> {
	let digits = value
		.strip_prefix("0x")
		.or_else(|| value.strip_prefix("0X"))
		.ok_or_else(|| {
			DecimalError::parse_error("Hex quantity must start with 0x", None, input_metadata(value))
		})?;
	if digits.is_empty() {
		return Ok(BigInt::zero());
	}
	BigInt::parse_bytes(digits.as_bytes(), 16).ok_or_else(|| {
		DecimalError::parse_error("Invalid hex quantity", None, input_metadata(value))
	})
}

/// Parses a `0x`-prefixed hexadecimal quantity that must fit into a `u64`.
pub fn parse_hex_u64(value: &str) -> Result<u64, DecimalError> {
	let digits = value.strip_prefix("0x").unwrap_or(value);
	if digits.is_empty() {
		return Ok(0);
	}
	u64::from_str_radix(digits, 16).map_err(|e| {
		DecimalError::parse_error("Invalid hex quantity", Some(Box::new(e)), input_metadata(value))
	})
}

/// Converts a decimal coin value into an integer amount of the smallest unit.
///
/// `scale_decimal("50.00000000", 8)` is `5000000000`. Inputs carrying more significant
/// fractional digits than `decimals` are rejected rather than rounded.
pub fn scale_decimal(value: &str, decimals: u32) -> Result<BigInt, DecimalError> {
	let parsed = BigDecimal::from_str(value.trim()).map_err(|e| {
		DecimalError::parse_error("Invalid decimal value", Some(Box::new(e)), input_metadata(value))
	})?;
	let scaled = parsed * BigDecimal::new(BigInt::from(1), -i64::from(decimals));
	if !scaled.is_integer() {
		return Err(DecimalError::arithmetic_error(
			"Value has more fractional digits than the currency supports",
			None,
			Some(HashMap::from([
				("input".to_string(), value.to_string()),
				("decimals".to_string(), decimals.to_string()),
			])),
		));
	}
	let (digits, scale) = scaled.with_scale(0).into_bigint_and_exponent();
	debug_assert_eq!(scale, 0);
	Ok(digits)
}

/// Renders an integer amount as a decimal coin value with `decimals` fractional digits.
pub fn unscale(value: &BigInt, decimals: u32) -> String {
	BigDecimal::new(value.clone(), i64::from(decimals)).to_plain_string()
}

/// Adds two decimal integer strings.
pub fn add(a: &str, b: &str) -> Result<String, DecimalError> {
	Ok((parse_integer(a)? + parse_integer(b)?).to_string())
}

/// Subtracts `b` from `a`.
pub fn sub(a: &str, b: &str) -> Result<String, DecimalError> {
	Ok((parse_integer(a)? - parse_integer(b)?).to_string())
}

/// Multiplies two decimal integer strings.
pub fn mul(a: &str, b: &str) -> Result<String, DecimalError> {
	Ok((parse_integer(a)? * parse_integer(b)?).to_string())
}

/// Divides `a` by `b`, truncating toward zero.
pub fn div(a: &str, b: &str) -> Result<String, DecimalError> {
	let divisor = parse_integer(b)?;
	if divisor.is_zero() {
		return Err(DecimalError::arithmetic_error(
			"Division by zero",
			None,
			Some(HashMap::from([("dividend".to_string(), a.to_string())])),
		));
	}
	Ok((parse_integer(a)? / divisor).to_string())
}

/// Compares two decimal integer strings numerically.
pub fn compare(a: &str, b: &str) -> Result<Ordering, DecimalError> {
	Ok(parse_integer(a)?.cmp(&parse_integer(b)?))
}

/// Negates a decimal integer string. Zero stays unsigned.
pub fn negate(a: &str) -> Result<String, DecimalError> {
	Ok((-parse_integer(a)?).to_string())
}

/// Sums an iterator of integers.
pub fn sum<'a>(values: impl IntoIterator<Item = &'a BigInt>) -> BigInt {
	values
		.into_iter()
		.fold(BigInt::zero(), |acc, value| acc + value)
}

/// Returns `true` for strictly negative values.
pub fn is_negative(value: &BigInt) -> bool {
	value.sign() == Sign::Minus
}

/// Returns the magnitude of a value.
pub fn abs(value: &BigInt) -> BigInt {
	value.abs()
}
