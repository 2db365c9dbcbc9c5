use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::bls::BlsPublicKey;
use crate::hash::{sha256, H256};

#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveValidator {
    pub bls_key: BlsPublicKey,
    pub bft_weight: u64,
}

/// The preimage of a `validators_hash`: the lexicographically ordered
/// validator list together with the certificate threshold.
#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorsData {
    pub validators: Vec<ActiveValidator>,
    pub certificate_threshold: u64,
    pub validators_hash: H256,
}

impl ValidatorsData {
    /// Total BFT weight of the validators selected by `selector`.
    pub fn selected_weight(&self, mut selector: impl FnMut(usize) -> bool) -> u64 {
        self.validators
            .iter()
            .enumerate()
            .filter(|(i, _)| selector(*i))
            .map(|(_, v)| v.bft_weight)
            .sum()
    }
}

/// Canonical hash of an ordered BLS-key/weight list and threshold.
#[must_use]
pub fn compute_validators_hash(validators: &[ActiveValidator], certificate_threshold: u64) -> H256 {
    let mut preimage = Vec::with_capacity(validators.len() * (BlsPublicKey::LENGTH + 8) + 8);
    for validator in validators {
        preimage.extend_from_slice(validator.bls_key.as_bytes());
        preimage.extend_from_slice(&validator.bft_weight.to_be_bytes());
    }
    preimage.extend_from_slice(&certificate_threshold.to_be_bytes());
    sha256(&preimage)
}

/// The minimal diff between two validator sets, as carried in a CCU.
///
/// `bft_weights_update_bitmap` covers the lexicographically sorted union of
/// the old and new key sets: bit `i` (counting from the most significant bit
/// of the big-endian byte string) is set iff the weight of union key `i` is
/// carried in `bft_weights_update`.
#[derive(
    BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
)]
#[serde(rename_all = "camelCase")]
pub struct ActiveValidatorsUpdate {
    pub bls_keys_update: Vec<BlsPublicKey>,
    pub bft_weights_update: Vec<u64>,
    #[serde(with = "hex")]
    pub bft_weights_update_bitmap: Vec<u8>,
}

impl ActiveValidatorsUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bls_keys_update.is_empty()
            && self.bft_weights_update.is_empty()
            && self.bft_weights_update_bitmap.is_empty()
    }
}
