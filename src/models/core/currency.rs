use serde::{Deserialize, Serialize};

/// Asset descriptor recorded the first time an event references it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
	pub id: String,
	pub name: Option<String>,
	pub symbol: Option<String>,
	/// Absent for non-fungible tokens
	pub decimals: Option<u32>,
}

impl Currency {
	pub fn new(
		id: impl Into<String>,
		name: Option<String>,
		symbol: Option<String>,
		decimals: Option<u32>,
	) -> Self {
		Self {
			id: id.into(),
			name,
			symbol,
			decimals,
		}
	}
}

/// Shape of a module's currency identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyFormat {
	/// `0x`-prefixed contract address, compared lower-case
	EvmAddress,
	/// Cosmos bank denomination, compared verbatim
	Denom,
	/// Base58 mint address, case-sensitive
	SolanaMint,
	/// `native` or `CODE:ISSUER`
	StellarAsset,
}

impl CurrencyFormat {
	/// Canonical form of an identifier, `None` if it does not fit the format.
	pub fn normalize(&self, id: &str) -> Option<String> {
		let id = id.trim();
		if id.is_empty() {
			return None;
		}
		match self {
			CurrencyFormat::EvmAddress => {
				let hex_part = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X"))?;
				(hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit()))
					.then(|| format!("0x{}", hex_part.to_ascii_lowercase()))
			}
			CurrencyFormat::Denom => Some(id.to_string()),
			CurrencyFormat::SolanaMint => id
				.chars()
				.all(|c| c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l'))
				.then(|| id.to_string()),
			CurrencyFormat::StellarAsset => {
				if id == "native" {
					return Some(id.to_string());
				}
				let (code, issuer) = id.split_once(':')?;
				(!code.is_empty() && code.len() <= 12 && issuer.len() == 56)
					.then(|| format!("{}:{}", code, issuer))
			}
		}
	}
}
