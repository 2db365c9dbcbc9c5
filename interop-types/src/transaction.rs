use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::ccm::OutboxRootWitness;
use crate::chain::ChainId;
use crate::hash::{sha256, H256};
use crate::validators::ActiveValidatorsUpdate;

/// Domain separation tag mixed into transaction signing bytes.
pub const MESSAGE_TAG_TRANSACTION: &[u8] = b"INTEROP_TRANSACTION_";

pub const COMMAND_SUBMIT_MAINCHAIN_CCU: &str = "submitMainchainCCU";
pub const COMMAND_SUBMIT_SIDECHAIN_CCU: &str = "submitSidechainCCU";

/// The CCM batch and witnesses appended to the receiving chain's inbox.
#[derive(
    BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
)]
#[serde(rename_all = "camelCase")]
pub struct InboxUpdate {
    /// Serialized CCMs in strict `(height, index-in-block)` order.
    pub cross_chain_messages: Vec<Vec<u8>>,
    /// Right witness proving a partial batch against the outbox root; empty
    /// when the batch is complete at the certified height.
    pub message_witness_hashes: Vec<H256>,
    /// Outbox-root inclusion proof taken at the height of the last included
    /// batch.
    pub outbox_root_witness: OutboxRootWitness,
}

/// Parameters of a cross-chain update transaction.
#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainUpdateParams {
    pub sending_chain_id: ChainId,
    /// Encoded certificate, or empty when no new certificate accompanies
    /// the update.
    #[serde(with = "hex")]
    pub certificate: Vec<u8>,
    pub active_validators_update: ActiveValidatorsUpdate,
    /// New certificate threshold, or 0 to signal "unchanged".
    pub certificate_threshold: u64,
    pub inbox_update: InboxUpdate,
}

impl CrossChainUpdateParams {
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("ccu params encoding is infallible")
    }
}

/// A receiving-chain transaction envelope.
#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub module: String,
    pub command: String,
    pub nonce: u64,
    pub fee: u64,
    #[serde(with = "hex")]
    pub sender_public_key: Vec<u8>,
    #[serde(with = "hex")]
    pub params: Vec<u8>,
    pub signatures: Vec<Signature>,
}

#[derive(BorshDeserialize, BorshSerialize, Clone, Debug, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str: String = serde::Deserialize::deserialize(deserializer)?;
        hex::decode(hex_str)
            .map(Signature)
            .map_err(serde::de::Error::custom)
    }
}

impl Serialize for Signature {
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

impl Transaction {
    /// The exact bytes the sender signs: tag, receiving chain ID, encoding
    /// of the transaction with an empty signature list.
    #[must_use]
    pub fn signing_bytes(&self, chain_id: ChainId) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.signatures = Vec::new();
        let encoded = borsh::to_vec(&unsigned).expect("transaction encoding is infallible");
        let mut message =
            Vec::with_capacity(MESSAGE_TAG_TRANSACTION.len() + ChainId::LENGTH + encoded.len());
        message.extend_from_slice(MESSAGE_TAG_TRANSACTION);
        message.extend_from_slice(chain_id.as_bytes());
        message.extend_from_slice(&encoded);
        message
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("transaction encoding is infallible")
    }

    /// Transaction identifier: hash of the full signed encoding.
    #[must_use]
    pub fn id(&self) -> H256 {
        sha256(&self.to_bytes())
    }
}

/// First 20 bytes of the hashed public key, hex-encoded; the account address
/// used by the receiving chain's auth module.
#[must_use]
pub fn address_from_public_key(public_key: &[u8]) -> String {
    hex::encode(&sha256(public_key).0[..20])
}

/// A locally recorded CCU transaction, kept for observability.
#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SentCcu {
    pub id: H256,
    pub nonce: u64,
    #[serde(with = "hex")]
    pub transaction: Vec<u8>,
}
