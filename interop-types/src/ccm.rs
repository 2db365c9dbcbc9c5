use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::hash::H256;

pub const MODULE_INTEROPERABILITY: &str = "interoperability";
pub const EVENT_CCM_SEND_SUCCESS: &str = "ccmSendSuccess";
pub const EVENT_CCM_PROCESSED: &str = "ccmProcessed";

/// Outcome of processing a CCM on the sending chain, carried by the
/// `ccmProcessed` event.
#[derive(
    BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
)]
#[serde(rename_all = "camelCase")]
pub enum CcmProcessedResult {
    Applied,
    Forwarded,
    Bounced,
    Discarded,
}

/// A cross-chain message emitted by the interoperability module.
#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainMessage {
    pub module: String,
    pub command: String,
    pub nonce: u64,
    pub fee: u64,
    pub sending_chain_id: ChainId,
    pub receiving_chain_id: ChainId,
    #[serde(with = "hex")]
    pub params: Vec<u8>,
    pub status: u32,
}

impl CrossChainMessage {
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("ccm encoding is infallible")
    }
}

/// Payload of the `ccmSendSuccess` event.
#[derive(BorshDeserialize, BorshSerialize, Clone, Debug, PartialEq, Eq)]
pub struct CcmSendSuccessData {
    pub ccm: CrossChainMessage,
}

/// Payload of the `ccmProcessed` event.
#[derive(BorshDeserialize, BorshSerialize, Clone, Debug, PartialEq, Eq)]
pub struct CcmProcessedData {
    pub ccm: CrossChainMessage,
    pub result: CcmProcessedResult,
    pub code: u32,
}

/// Merkle witness proving a subset of outbox leaves against the outbox root.
#[derive(
    BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRootWitness {
    #[serde(with = "hex")]
    pub bitmap: Vec<u8>,
    pub sibling_hashes: Vec<H256>,
}

/// The CCMs observed at one sending-chain height together with the outbox
/// inclusion proof taken at that height.
#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CcmsAtHeight {
    pub height: u32,
    pub ccms: Vec<CrossChainMessage>,
    pub inclusion_proof: OutboxRootWitness,
}

/// Cursor over the CCM stream: the last message included in a submitted CCU.
#[derive(
    BorshDeserialize,
    BorshSerialize,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "camelCase")]
pub struct LastSentCcm {
    pub height: u32,
    pub nonce: u64,
}
