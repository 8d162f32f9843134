//! Ethereum Beacon API response shapes.
//!
//! The Beacon API encodes every integer as a decimal string; fields are kept as strings
//! and parsed where they are used.

use serde::{Deserialize, Serialize};

/// `{"data": ...}` envelope of every Beacon API response
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconResponse<T> {
	pub data: T,
}

/// `GET /eth/v1/beacon/headers/{slot}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconHeader {
	pub root: String,
	pub header: BeaconSignedHeader,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconSignedHeader {
	pub message: BeaconHeaderMessage,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconHeaderMessage {
	pub slot: String,
	pub proposer_index: String,
}

/// `GET /eth/v2/beacon/blocks/{slot}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconSignedBlock {
	pub message: BeaconBlockMessage,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconBlockMessage {
	pub slot: String,
	pub proposer_index: String,
	pub body: BeaconBlockBody,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BeaconBlockBody {
	#[serde(default)]
	pub deposits: Vec<BeaconDeposit>,
	#[serde(default)]
	pub proposer_slashings: Vec<BeaconProposerSlashing>,
	#[serde(default)]
	pub attester_slashings: Vec<BeaconAttesterSlashing>,
	#[serde(default)]
	pub execution_payload: Option<BeaconExecutionPayload>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconDeposit {
	pub data: BeaconDepositData,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconDepositData {
	pub pubkey: String,
	/// Gwei
	pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconProposerSlashing {
	pub signed_header_1: BeaconSignedHeader,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconAttesterSlashing {
	pub attestation_1: BeaconIndexedAttestation,
	pub attestation_2: BeaconIndexedAttestation,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconIndexedAttestation {
	pub attesting_indices: Vec<String>,
}

impl BeaconAttesterSlashing {
	/// Validators attesting in both conflicting attestations, ascending
	pub fn slashed_indices(&self) -> Vec<String> {
		let mut indices: Vec<String> = self
			.attestation_1
			.attesting_indices
			.iter()
			.filter(|index| self.attestation_2.attesting_indices.contains(index))
			.cloned()
			.collect();
		indices.sort_by_key(|index| index.parse::<u64>().unwrap_or(u64::MAX));
		indices.dedup();
		indices
	}
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BeaconExecutionPayload {
	#[serde(default)]
	pub withdrawals: Vec<BeaconWithdrawal>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconWithdrawal {
	pub validator_index: String,
	/// Gwei
	pub amount: String,
}

/// `GET /eth/v1/beacon/rewards/blocks/{slot}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconBlockRewards {
	pub proposer_index: String,
	pub total: String,
	pub attestations: String,
	pub sync_aggregate: String,
	#[serde(default)]
	pub proposer_slashings: Option<String>,
	#[serde(default)]
	pub attester_slashings: Option<String>,
}

/// One entry of `POST /eth/v1/beacon/rewards/sync_committee/{slot}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconSyncCommitteeReward {
	pub validator_index: String,
	/// Negative for missed participation
	pub reward: String,
}

/// `POST /eth/v1/beacon/rewards/attestations/{epoch}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconAttestationRewards {
	#[serde(default)]
	pub total_rewards: Vec<BeaconAttestationReward>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconAttestationReward {
	pub validator_index: String,
	pub head: String,
	pub target: String,
	pub source: String,
	#[serde(default)]
	pub inactivity: Option<String>,
}

/// One entry of `GET /eth/v1/beacon/states/{state}/validators`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconValidator {
	pub index: String,
	pub balance: String,
	pub validator: BeaconValidatorInfo,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconValidatorInfo {
	pub pubkey: String,
	pub effective_balance: String,
	#[serde(default)]
	pub slashed: bool,
}
