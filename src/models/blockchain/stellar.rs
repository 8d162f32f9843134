//! Stellar Horizon REST response shapes.
//!
//! Horizon renders amounts as decimal strings with seven fractional digits and pages its
//! collections under `_embedded.records`.

use serde::{Deserialize, Serialize};

/// Native lumens, written `native` in currency ids
pub const NATIVE_ASSET: &str = "native";

/// One page of a Horizon collection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HorizonPage<T> {
	#[serde(rename = "_embedded")]
	pub embedded: HorizonRecords<T>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HorizonRecords<T> {
	pub records: Vec<T>,
}

/// `GET /ledgers/{sequence}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HorizonLedger {
	pub sequence: u64,
	pub hash: String,
	/// RFC 3339
	pub closed_at: String,
	pub successful_transaction_count: usize,
	pub failed_transaction_count: usize,
	/// Operations of successful and failed transactions
	#[serde(default)]
	pub tx_set_operation_count: Option<usize>,
}

impl HorizonLedger {
	pub fn transaction_count(&self) -> usize {
		self.successful_transaction_count + self.failed_transaction_count
	}
}

/// `GET /` of a Horizon server
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HorizonRoot {
	pub history_latest_ledger: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HorizonTransaction {
	pub paging_token: String,
	pub hash: String,
	pub successful: bool,
	/// Account paying the fee, the fee-bump sponsor when there is one
	pub fee_account: String,
	/// Stroops
	pub fee_charged: String,
	pub operation_count: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HorizonOperation {
	pub id: String,
	pub paging_token: String,
	pub transaction_hash: String,
	#[serde(rename = "type")]
	pub operation_type: String,
}

/// Asset fields as Horizon flattens them into effects and balances
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HorizonAsset {
	#[serde(default)]
	pub asset_type: Option<String>,
	#[serde(default)]
	pub asset_code: Option<String>,
	#[serde(default)]
	pub asset_issuer: Option<String>,
}

impl HorizonAsset {
	/// `native` or `CODE:ISSUER`, `None` for pool shares and incomplete assets
	pub fn id(&self) -> Option<String> {
		match self.asset_type.as_deref()? {
			NATIVE_ASSET => Some(NATIVE_ASSET.to_string()),
			"credit_alphanum4" | "credit_alphanum12" => Some(format!(
				"{}:{}",
				self.asset_code.as_deref()?,
				self.asset_issuer.as_deref()?
			)),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HorizonEffect {
	/// `{operation id}-{index}`
	pub paging_token: String,
	pub account: String,
	#[serde(rename = "type")]
	pub effect_type: String,
	#[serde(default)]
	pub amount: Option<String>,
	#[serde(default)]
	pub starting_balance: Option<String>,
	#[serde(flatten)]
	pub asset: HorizonAsset,
	#[serde(default)]
	pub sold_amount: Option<String>,
	#[serde(default)]
	pub sold_asset_type: Option<String>,
	#[serde(default)]
	pub sold_asset_code: Option<String>,
	#[serde(default)]
	pub sold_asset_issuer: Option<String>,
	#[serde(default)]
	pub bought_amount: Option<String>,
	#[serde(default)]
	pub bought_asset_type: Option<String>,
	#[serde(default)]
	pub bought_asset_code: Option<String>,
	#[serde(default)]
	pub bought_asset_issuer: Option<String>,
}

impl HorizonEffect {
	/// Id of the operation that caused the effect
	pub fn operation_id(&self) -> &str {
		self.paging_token
			.split_once('-')
			.map_or(self.paging_token.as_str(), |(operation, _)| operation)
	}

	pub fn sold_asset(&self) -> HorizonAsset {
		HorizonAsset {
			asset_type: self.sold_asset_type.clone(),
			asset_code: self.sold_asset_code.clone(),
			asset_issuer: self.sold_asset_issuer.clone(),
		}
	}

	pub fn bought_asset(&self) -> HorizonAsset {
		HorizonAsset {
			asset_type: self.bought_asset_type.clone(),
			asset_code: self.bought_asset_code.clone(),
			asset_issuer: self.bought_asset_issuer.clone(),
		}
	}
}

/// `GET /accounts/{id}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HorizonAccount {
	pub balances: Vec<HorizonBalance>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HorizonBalance {
	pub balance: String,
	#[serde(flatten)]
	pub asset: HorizonAsset,
}
