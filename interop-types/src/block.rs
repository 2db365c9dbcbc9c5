use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::bls::BlsSignature;
use crate::hash::{sha256, H256};

/// An aggregated BLS commit over a certifiable height by a subset of
/// validators. `certificate_signature` is empty when no commit exists.
#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCommit {
    pub height: u32,
    /// Participation bitmap: bit `i` (byte `i / 8`, LSB first) marks the
    /// validator at position `i` of the lexicographically ordered set.
    pub aggregation_bits: AggregationBits,
    pub certificate_signature: BlsSignature,
}

impl AggregateCommit {
    #[must_use]
    pub fn has_signature(&self) -> bool {
        !self.certificate_signature.is_empty()
    }
}

#[derive(BorshDeserialize, BorshSerialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct AggregationBits(pub Vec<u8>);

impl AggregationBits {
    #[must_use]
    pub fn is_set(&self, index: usize) -> bool {
        self.0
            .get(index / 8)
            .is_some_and(|byte| (byte >> (index % 8)) & 1 == 1)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for AggregationBits {
    fn from(bytes: Vec<u8>) -> Self {
        AggregationBits(bytes)
    }
}

impl<'de> Deserialize<'de> for AggregationBits {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str: String = serde::Deserialize::deserialize(deserializer)?;
        hex::decode(hex_str)
            .map(AggregationBits)
            .map_err(serde::de::Error::custom)
    }
}

impl Serialize for AggregationBits {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> Result<<S as serde::Serializer>::Ok, <S as serde::Serializer>::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

/// The sending-chain block header fields the connector observes and stores.
#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub height: u32,
    pub timestamp: u32,
    /// Identifier of the previous block in the chain.
    pub previous_block_id: H256,
    /// Root of the chain state tree after executing this block.
    pub state_root: H256,
    /// Canonical hash of the validator set active at this height.
    pub validators_hash: H256,
    #[serde(default)]
    pub aggregate_commit: Option<AggregateCommit>,
}

impl BlockHeader {
    /// Block identifier: hash of the full encoded header.
    #[must_use]
    pub fn id(&self) -> H256 {
        let encoded = borsh::to_vec(self).expect("header encoding is infallible");
        sha256(&encoded)
    }
}
